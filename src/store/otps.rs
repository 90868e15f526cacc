use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::Result;
use crate::model::{Otp, OtpType};
use crate::store::{dt_col, fmt_dt, label_col, new_id};

const COLUMNS: &str = "id, task_id, code, otp_type, is_used, created_at, expires_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Otp> {
    Ok(Otp {
        id: row.get(0)?,
        task_id: row.get(1)?,
        code: row.get(2)?,
        otp_type: label_col(row, 3)?,
        is_used: row.get(4)?,
        created_at: dt_col(row, 5)?,
        expires_at: dt_col(row, 6)?,
    })
}

pub fn insert(
    conn: &Connection,
    task_id: &str,
    otp_type: OtpType,
    code: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Otp> {
    let id = new_id();
    conn.execute(
        "INSERT INTO otps (id, task_id, code, otp_type, is_used, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
        params![
            &id,
            task_id,
            code,
            otp_type.as_str(),
            fmt_dt(now),
            fmt_dt(expires_at)
        ],
    )?;
    Ok(Otp {
        id,
        task_id: task_id.to_string(),
        code: code.to_string(),
        otp_type,
        is_used: false,
        created_at: now,
        expires_at,
    })
}

/// The unused, unexpired OTP of this type for a task, newest first.
pub fn live(
    conn: &Connection,
    task_id: &str,
    otp_type: OtpType,
    now: DateTime<Utc>,
) -> Result<Option<Otp>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM otps
             WHERE task_id = ?1 AND otp_type = ?2 AND is_used = 0 AND expires_at > ?3
             ORDER BY created_at DESC LIMIT 1"
        ),
        params![task_id, otp_type.as_str(), fmt_dt(now)],
        from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// True when `code` matches a live OTP of this type. Does not consume it.
pub fn matches(
    conn: &Connection,
    task_id: &str,
    otp_type: OtpType,
    code: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let found: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM otps
            WHERE task_id = ?1 AND otp_type = ?2 AND code = ?3 AND is_used = 0 AND expires_at > ?4
         )",
        params![task_id, otp_type.as_str(), code, fmt_dt(now)],
        |row| row.get(0),
    )?;
    Ok(found == 1)
}

/// Mark a matching live OTP as used in a single conditional update.
///
/// Returns `false` when no live OTP matched, so a used or expired code can
/// never be consumed twice.
pub fn consume(
    conn: &Connection,
    task_id: &str,
    otp_type: OtpType,
    code: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let changes = conn.execute(
        "UPDATE otps SET is_used = 1
         WHERE task_id = ?1 AND otp_type = ?2 AND code = ?3 AND is_used = 0 AND expires_at > ?4",
        params![task_id, otp_type.as_str(), code, fmt_dt(now)],
    )?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, Role, VerificationStatus};
    use crate::store::tasks::{self, NewTask};
    use crate::store::{MarketDb, profiles};
    use chrono::Duration;

    fn seed_task(db: &MarketDb) -> String {
        let now = Utc::now();
        let client = profiles::insert(db.conn(), "c", Role::Client, None, VerificationStatus::None, now)
            .unwrap();
        tasks::insert(
            db.conn(),
            &client.id,
            &NewTask {
                title: "Set up router".into(),
                description: None,
                budget: 5_000,
                mode: Mode::Standard,
                is_nearby: false,
                location: None,
                address_text: None,
            },
            now,
        )
        .unwrap()
        .id
    }

    #[test]
    fn live_ignores_expired_and_other_types() {
        let db = MarketDb::open_memory().unwrap();
        let task = seed_task(&db);
        let now = Utc::now();

        insert(db.conn(), &task, OtpType::Start, "1111", now - Duration::hours(1), now - Duration::minutes(1)).unwrap();
        assert!(live(db.conn(), &task, OtpType::Start, now).unwrap().is_none());

        insert(db.conn(), &task, OtpType::End, "2222", now, now + Duration::minutes(30)).unwrap();
        assert!(live(db.conn(), &task, OtpType::Start, now).unwrap().is_none());
        assert_eq!(live(db.conn(), &task, OtpType::End, now).unwrap().unwrap().code, "2222");
    }

    #[test]
    fn consume_is_single_use() {
        let db = MarketDb::open_memory().unwrap();
        let task = seed_task(&db);
        let now = Utc::now();
        insert(db.conn(), &task, OtpType::Start, "4821", now, now + Duration::minutes(30)).unwrap();

        assert!(matches(db.conn(), &task, OtpType::Start, "4821", now).unwrap());
        assert!(!consume(db.conn(), &task, OtpType::Start, "0000", now).unwrap());
        assert!(consume(db.conn(), &task, OtpType::Start, "4821", now).unwrap());
        assert!(!consume(db.conn(), &task, OtpType::Start, "4821", now).unwrap());
        assert!(!matches(db.conn(), &task, OtpType::Start, "4821", now).unwrap());
    }

    #[test]
    fn expired_code_cannot_be_consumed() {
        let db = MarketDb::open_memory().unwrap();
        let task = seed_task(&db);
        let now = Utc::now();
        let otp = insert(db.conn(), &task, OtpType::End, "9090", now, now + Duration::minutes(30)).unwrap();

        assert!(!consume(db.conn(), &task, OtpType::End, "9090", otp.expires_at).unwrap());
        assert!(consume(db.conn(), &task, OtpType::End, "9090", otp.expires_at - Duration::seconds(1)).unwrap());
    }
}
