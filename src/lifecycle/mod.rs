//! Task lifecycle: acceptance, OTP gates and the status transition authority.
//!
//! Every operation here runs inside one IMMEDIATE transaction. Preconditions
//! are re-read inside the transaction, and the writes that matter for races
//! (handshake insert, status change, OTP consumption) are conditional at the
//! SQL level, so two callers can never both observe success.

pub mod accept;
pub mod create;
pub mod otp;
pub mod transition;

use crate::error::{MarketError, Result};
use crate::model::Status;

pub use accept::{Acceptance, accept};
pub use create::create_task;
pub use otp::{IssuedOtp, issue_otp, verify_otp};
pub use transition::{TransitionOutcome, TransitionRequest, transition};

/// The fixed transition table.
pub fn allowed_targets(from: Status) -> &'static [Status] {
    match from {
        Status::Open => &[Status::Assigned, Status::Cancelled],
        Status::Assigned => &[Status::InProgress, Status::Cancelled],
        Status::InProgress => &[Status::Review, Status::Cancelled],
        Status::Review => &[Status::Completed, Status::Disputed],
        Status::Disputed => &[Status::Completed, Status::Cancelled],
        Status::Completed | Status::Cancelled => &[],
    }
}

pub fn check_transition(from: Status, to: Status) -> Result<()> {
    let allowed = allowed_targets(from);
    if allowed.contains(&to) {
        Ok(())
    } else {
        Err(MarketError::InvalidTransition { from, to, allowed })
    }
}
