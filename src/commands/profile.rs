use chrono::Utc;

use crate::error::Result;
use crate::model::{Role, VerificationStatus};
use crate::output::{self, Format};
use crate::store::{Store, profiles};

pub fn create(
    store: &Store,
    user_id: &str,
    role: Role,
    full_name: Option<&str>,
    verification: VerificationStatus,
    format: Format,
) -> Result<()> {
    let db = store.open()?;
    let profile = profiles::insert(db.conn(), user_id, role, full_name, verification, Utc::now())?;
    output::print_profile(&profile, format)
}

pub fn verify(store: &Store, user_id: &str, status: VerificationStatus, format: Format) -> Result<()> {
    let db = store.open()?;
    let profile = profiles::by_user(db.conn(), user_id)?;
    let updated = profiles::set_verification(db.conn(), &profile.id, status, Utc::now())?;
    output::print_profile(&updated, format)
}

pub fn show(store: &Store, user_id: &str, format: Format) -> Result<()> {
    let db = store.open()?;
    let profile = profiles::by_user(db.conn(), user_id)?;
    output::print_profile(&profile, format)
}
