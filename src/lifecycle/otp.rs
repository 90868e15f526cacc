use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{MarketError, Result};
use crate::model::{Otp, OtpType};
use crate::store::{MarketDb, handshakes, otps, profiles, tasks};

pub const DEFAULT_OTP_TTL_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct IssuedOtp {
    pub otp: Otp,
    /// True when an existing live code was returned instead of a new one.
    pub reused: bool,
}

/// Generate a 4-digit code in `1000..=9999` from the OS CSPRNG.
pub fn generate_code() -> Result<String> {
    generate_code_with(|bytes| {
        getrandom::fill(bytes).map_err(|e| MarketError::RandomSource(e.to_string()))
    })
}

pub(crate) fn generate_code_with<F>(mut fill_random: F) -> Result<String>
where
    F: FnMut(&mut [u8]) -> Result<()>,
{
    let mut buf = [0u8; 4];
    fill_random(&mut buf)?;
    let n = u32::from_le_bytes(buf) % 9000 + 1000;
    Ok(n.to_string())
}

pub fn is_valid_format(code: &str) -> bool {
    code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Issue (or re-issue) the OTP gating the next transition of a task.
///
/// Only the task's client may issue. While a live code of the same type
/// exists it is returned unchanged, so repeated requests are idempotent.
pub fn issue_otp(
    db: &mut MarketDb,
    task_id: &str,
    otp_type: OtpType,
    user_id: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<IssuedOtp> {
    let tx = db.immediate()?;

    let caller = profiles::by_user(&tx, user_id)?;
    let task = tasks::get(&tx, task_id)?;
    if task.client_id != caller.id {
        return Err(MarketError::Forbidden("only the client can generate an OTP"));
    }

    let required = otp_type.issuable_in();
    if task.status != required {
        return Err(MarketError::OtpStatusMismatch {
            otp_type,
            required,
            actual: task.status,
        });
    }

    if let Some(existing) = otps::live(&tx, task_id, otp_type, now)? {
        return Ok(IssuedOtp {
            otp: existing,
            reused: true,
        });
    }

    let code = generate_code()?;
    let otp = otps::insert(&tx, task_id, otp_type, &code, now, now + ttl)?;
    tx.commit()?;

    tracing::info!(task_id, otp_type = %otp_type, expires_at = %otp.expires_at, "otp issued");
    Ok(IssuedOtp { otp, reused: false })
}

/// Check a code without consuming it. Only the assigned freelancer may verify.
pub fn verify_otp(
    db: &MarketDb,
    task_id: &str,
    otp_type: OtpType,
    code: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let conn = db.conn();
    let caller = profiles::by_user(conn, user_id)?;
    tasks::get(conn, task_id)?;

    let assigned = handshakes::active_for_task(conn, task_id)?;
    if assigned.as_ref().map(|h| h.freelancer_id.as_str()) != Some(caller.id.as_str()) {
        return Err(MarketError::Forbidden(
            "only the assigned freelancer can verify an OTP",
        ));
    }

    if is_valid_format(code) && otps::matches(conn, task_id, otp_type, code, now)? {
        Ok(())
    } else {
        Err(MarketError::InvalidOtp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::accept;
    use crate::model::{Mode, Role, Status, VerificationStatus};
    use crate::store::tasks::NewTask;

    fn assigned_task() -> (MarketDb, String) {
        let mut db = MarketDb::open_memory().unwrap();
        let now = Utc::now();
        let client = profiles::insert(db.conn(), "client", Role::Client, None, VerificationStatus::None, now)
            .unwrap();
        profiles::insert(db.conn(), "worker", Role::Freelancer, None, VerificationStatus::None, now)
            .unwrap();
        profiles::insert(db.conn(), "bystander", Role::Freelancer, None, VerificationStatus::None, now)
            .unwrap();
        let task = tasks::insert(
            db.conn(),
            &client.id,
            &NewTask {
                title: "Assemble desk".into(),
                description: None,
                budget: 20_000,
                mode: Mode::Standard,
                is_nearby: false,
                location: None,
                address_text: None,
            },
            now,
        )
        .unwrap();
        accept(&mut db, &task.id, "worker", now).unwrap();
        (db, task.id)
    }

    fn ttl() -> Duration {
        Duration::seconds(DEFAULT_OTP_TTL_SECS)
    }

    #[test]
    fn codes_are_four_digits() {
        for _ in 0..64 {
            let code = generate_code().unwrap();
            assert!(is_valid_format(&code), "bad code {code}");
            let n: u32 = code.parse().unwrap();
            assert!((1000..=9999).contains(&n));
        }
    }

    #[test]
    fn injected_entropy_maps_into_range() {
        let low = generate_code_with(|b| {
            b.fill(0);
            Ok(())
        })
        .unwrap();
        assert_eq!(low, "1000");
        let high = generate_code_with(|b| {
            b.copy_from_slice(&8999u32.to_le_bytes());
            Ok(())
        })
        .unwrap();
        assert_eq!(high, "9999");
    }

    #[test]
    fn format_check() {
        assert!(is_valid_format("0042"));
        assert!(!is_valid_format("42"));
        assert!(!is_valid_format("12a4"));
        assert!(!is_valid_format("12345"));
    }

    #[test]
    fn reissue_while_live_is_idempotent() {
        let (mut db, task) = assigned_task();
        let now = Utc::now();
        let first = issue_otp(&mut db, &task, OtpType::Start, "client", now, ttl()).unwrap();
        assert!(!first.reused);
        let again = issue_otp(&mut db, &task, OtpType::Start, "client", now + Duration::minutes(5), ttl()).unwrap();
        assert!(again.reused);
        assert_eq!(again.otp.id, first.otp.id);
        assert_eq!(again.otp.code, first.otp.code);
    }

    #[test]
    fn reissue_after_expiry_mints_new_code() {
        let (mut db, task) = assigned_task();
        let now = Utc::now();
        let first = issue_otp(&mut db, &task, OtpType::Start, "client", now, ttl()).unwrap();
        let later = issue_otp(&mut db, &task, OtpType::Start, "client", first.otp.expires_at, ttl()).unwrap();
        assert!(!later.reused);
        assert_ne!(later.otp.id, first.otp.id);
    }

    #[test]
    fn only_client_may_issue() {
        let (mut db, task) = assigned_task();
        let err = issue_otp(&mut db, &task, OtpType::Start, "worker", Utc::now(), ttl()).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[test]
    fn end_otp_requires_in_progress() {
        let (mut db, task) = assigned_task();
        let err = issue_otp(&mut db, &task, OtpType::End, "client", Utc::now(), ttl()).unwrap_err();
        match err {
            MarketError::OtpStatusMismatch { required, actual, .. } => {
                assert_eq!(required, Status::InProgress);
                assert_eq!(actual, Status::Assigned);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn verify_checks_caller_and_code_without_consuming() {
        let (mut db, task) = assigned_task();
        let now = Utc::now();
        let issued = issue_otp(&mut db, &task, OtpType::Start, "client", now, ttl()).unwrap();
        let code = issued.otp.code;

        verify_otp(&db, &task, OtpType::Start, &code, "worker", now).unwrap();
        verify_otp(&db, &task, OtpType::Start, &code, "worker", now).unwrap();

        let err = verify_otp(&db, &task, OtpType::Start, &code, "bystander", now).unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let err = verify_otp(&db, &task, OtpType::End, &code, "worker", now).unwrap_err();
        assert!(matches!(err, MarketError::InvalidOtp));

        let err = verify_otp(&db, &task, OtpType::Start, &code, "worker", now + ttl()).unwrap_err();
        assert!(matches!(err, MarketError::InvalidOtp));
    }
}
