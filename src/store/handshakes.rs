use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{MarketError, Result};
use crate::model::Handshake;
use crate::store::{dt_col, fmt_dt, is_unique_violation, new_id};

const COLUMNS: &str = "id, task_id, freelancer_id, accepted_at, is_cancelled, cancelled_reason";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Handshake> {
    Ok(Handshake {
        id: row.get(0)?,
        task_id: row.get(1)?,
        freelancer_id: row.get(2)?,
        accepted_at: dt_col(row, 3)?,
        is_cancelled: row.get(4)?,
        cancelled_reason: row.get(5)?,
    })
}

/// Insert the active handshake for a task.
///
/// The partial unique index on `task_id WHERE is_cancelled = 0` makes this the
/// first-writer-wins gate: a second insert for the same task fails with
/// [`MarketError::AlreadyTaken`].
pub fn insert(
    conn: &Connection,
    task_id: &str,
    freelancer_id: &str,
    now: DateTime<Utc>,
) -> Result<Handshake> {
    let id = new_id();
    conn.execute(
        "INSERT INTO task_handshakes (id, task_id, freelancer_id, accepted_at, is_cancelled)
         VALUES (?1, ?2, ?3, ?4, 0)",
        params![&id, task_id, freelancer_id, fmt_dt(now)],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            MarketError::AlreadyTaken(task_id.to_string())
        } else {
            MarketError::Db(e)
        }
    })?;
    Ok(Handshake {
        id,
        task_id: task_id.to_string(),
        freelancer_id: freelancer_id.to_string(),
        accepted_at: now,
        is_cancelled: false,
        cancelled_reason: None,
    })
}

/// The non-cancelled handshake for a task, if any.
pub fn active_for_task(conn: &Connection, task_id: &str) -> Result<Option<Handshake>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM task_handshakes WHERE task_id = ?1 AND is_cancelled = 0"),
        params![task_id],
        from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// All handshakes ever recorded for a task, oldest first.
pub fn history(conn: &Connection, task_id: &str) -> Result<Vec<Handshake>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM task_handshakes WHERE task_id = ?1 ORDER BY accepted_at, id"
    ))?;
    let rows = stmt.query_map(params![task_id], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Soft-cancel the active handshake. Returns whether one existed.
pub fn cancel_active(conn: &Connection, task_id: &str, reason: Option<&str>) -> Result<bool> {
    let changes = conn.execute(
        "UPDATE task_handshakes SET is_cancelled = 1, cancelled_reason = ?2
         WHERE task_id = ?1 AND is_cancelled = 0",
        params![task_id, reason],
    )?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, Role, VerificationStatus};
    use crate::store::tasks::{self, NewTask};
    use crate::store::{MarketDb, profiles};

    fn seed(db: &MarketDb) -> (String, String, String) {
        let now = Utc::now();
        let conn = db.conn();
        let client = profiles::insert(conn, "c", Role::Client, None, VerificationStatus::None, now)
            .unwrap();
        let a = profiles::insert(conn, "a", Role::Freelancer, None, VerificationStatus::None, now)
            .unwrap();
        let b = profiles::insert(conn, "b", Role::Freelancer, None, VerificationStatus::None, now)
            .unwrap();
        let task = tasks::insert(
            conn,
            &client.id,
            &NewTask {
                title: "Deliver parcel".into(),
                description: None,
                budget: 10_000,
                mode: Mode::Immediate,
                is_nearby: false,
                location: None,
                address_text: None,
            },
            now,
        )
        .unwrap();
        (task.id, a.id, b.id)
    }

    #[test]
    fn second_active_handshake_is_already_taken() {
        let db = MarketDb::open_memory().unwrap();
        let (task, a, b) = seed(&db);

        insert(db.conn(), &task, &a, Utc::now()).unwrap();
        let err = insert(db.conn(), &task, &b, Utc::now()).unwrap_err();
        assert!(matches!(err, MarketError::AlreadyTaken(ref id) if id == &task));

        let active = active_for_task(db.conn(), &task).unwrap().unwrap();
        assert_eq!(active.freelancer_id, a);
    }

    #[test]
    fn cancelled_handshake_frees_the_slot() {
        let db = MarketDb::open_memory().unwrap();
        let (task, a, b) = seed(&db);

        insert(db.conn(), &task, &a, Utc::now()).unwrap();
        assert!(cancel_active(db.conn(), &task, Some("client cancelled")).unwrap());
        assert!(active_for_task(db.conn(), &task).unwrap().is_none());
        assert!(!cancel_active(db.conn(), &task, None).unwrap());

        insert(db.conn(), &task, &b, Utc::now()).unwrap();
        let all = history(db.conn(), &task).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.iter().filter(|h| !h.is_cancelled).count(), 1);
        assert_eq!(all[0].cancelled_reason.as_deref(), Some("client cancelled"));
    }
}
