use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::model::{Status, TaskEvent};
use crate::store::{dt_col, fmt_dt, label_col_opt};

pub const DEFAULT_PAGE: u32 = 100;
pub const MAX_PAGE: u32 = 500;

/// Append an event to the task change feed.
pub fn append(
    conn: &Connection,
    task_id: &str,
    actor: Option<&str>,
    event_type: &str,
    from_status: Option<Status>,
    to_status: Option<Status>,
    now: DateTime<Utc>,
) -> Result<TaskEvent> {
    conn.execute(
        "INSERT INTO task_events (task_id, actor, event_type, from_status, to_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            task_id,
            actor,
            event_type,
            from_status.map(Status::as_str),
            to_status.map(Status::as_str),
            fmt_dt(now)
        ],
    )?;
    Ok(TaskEvent {
        id: conn.last_insert_rowid(),
        task_id: task_id.to_string(),
        actor: actor.map(str::to_string),
        event_type: event_type.to_string(),
        from_status,
        to_status,
        created_at: now,
    })
}

/// Events with id greater than `after`, oldest first.
///
/// Consumers poll with the last id they saw; ids are monotonic so no event is
/// skipped between polls.
pub fn read_after(
    conn: &Connection,
    after: i64,
    task_id: Option<&str>,
    limit: Option<u32>,
) -> Result<Vec<TaskEvent>> {
    let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let mut stmt = conn.prepare(
        "SELECT id, task_id, actor, event_type, from_status, to_status, created_at
         FROM task_events
         WHERE id > ?1 AND (?2 IS NULL OR task_id = ?2)
         ORDER BY id
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![after, task_id, limit], |row| {
        Ok(TaskEvent {
            id: row.get(0)?,
            task_id: row.get(1)?,
            actor: row.get(2)?,
            event_type: row.get(3)?,
            from_status: label_col_opt(row, 4)?,
            to_status: label_col_opt(row, 5)?,
            created_at: dt_col(row, 6)?,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}
