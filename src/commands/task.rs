use chrono::Utc;

use crate::discovery;
use crate::error::Result;
use crate::geo::GeoPoint;
use crate::lifecycle;
use crate::model::Status;
use crate::output::{self, Format};
use crate::store::tasks::{self, NewTask};
use crate::store::Store;

pub fn create(store: &Store, client_user: &str, new: &NewTask, format: Format) -> Result<()> {
    let mut db = store.open()?;
    let task = lifecycle::create_task(&mut db, client_user, new, Utc::now())?;
    output::print_task(&task, format)
}

pub fn show(store: &Store, id: &str, format: Format) -> Result<()> {
    let db = store.open()?;
    let task = tasks::get(db.conn(), id)?;
    output::print_task(&task, format)
}

pub fn list(store: &Store, status: Option<Status>, format: Format) -> Result<()> {
    let db = store.open()?;
    let found = tasks::list(db.conn(), status)?;
    output::print_tasks(&found, format)
}

pub fn nearby(
    store: &Store,
    user_id: &str,
    origin: GeoPoint,
    radius_m: f64,
    format: Format,
) -> Result<()> {
    let db = store.open()?;
    let results = discovery::find_nearby(&db, user_id, origin, radius_m)?;
    match format {
        Format::Json => output::print_json(&results)?,
        _ => {
            for hit in &results.tasks {
                println!("{}", output::nearby_line(&hit.task, hit.distance_meters));
            }
            eprintln!(
                "{} task(s) within {}m (caller verification: {})",
                results.tasks.len(),
                radius_m,
                results.verification_status
            );
        }
    }
    Ok(())
}
