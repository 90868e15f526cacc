use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::model::Chat;
use crate::store::{dt_col, fmt_dt, new_id};

/// Open the chat for a task, returning the existing one if already created.
pub fn open_for_task(conn: &Connection, task_id: &str, now: DateTime<Utc>) -> Result<Chat> {
    conn.execute(
        "INSERT OR IGNORE INTO chats (id, task_id, created_at) VALUES (?1, ?2, ?3)",
        params![new_id(), task_id, fmt_dt(now)],
    )?;
    let chat = conn.query_row(
        "SELECT id, task_id, created_at FROM chats WHERE task_id = ?1",
        params![task_id],
        |row| {
            Ok(Chat {
                id: row.get(0)?,
                task_id: row.get(1)?,
                created_at: dt_col(row, 2)?,
            })
        },
    )?;
    Ok(chat)
}
