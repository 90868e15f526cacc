use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{MarketError, Result};
use crate::model::{Profile, Role, VerificationStatus};
use crate::store::{dt_col, fmt_dt, is_unique_violation, label_col, new_id};

const COLUMNS: &str = "id, user_id, role, full_name, verification_status, completed_tasks, \
                       created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role: label_col(row, 2)?,
        full_name: row.get(3)?,
        verification_status: label_col(row, 4)?,
        completed_tasks: row.get(5)?,
        created_at: dt_col(row, 6)?,
        updated_at: dt_col(row, 7)?,
    })
}

/// Register a profile for an authenticated subject.
pub fn insert(
    conn: &Connection,
    user_id: &str,
    role: Role,
    full_name: Option<&str>,
    verification: VerificationStatus,
    now: DateTime<Utc>,
) -> Result<Profile> {
    if user_id.trim().is_empty() {
        return Err(MarketError::Validation("user id must be non-empty".into()));
    }
    let id = new_id();
    let ts = fmt_dt(now);
    conn.execute(
        "INSERT INTO profiles (id, user_id, role, full_name, verification_status, completed_tasks, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
        params![&id, user_id, role.as_str(), full_name, verification.as_str(), &ts],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            MarketError::Validation(format!("a profile for user '{user_id}' already exists"))
        } else {
            MarketError::Db(e)
        }
    })?;
    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> Result<Profile> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM profiles WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()?
    .ok_or_else(|| MarketError::ProfileNotFound(id.to_string()))
}

/// Resolve the profile behind an authenticated subject.
pub fn by_user(conn: &Connection, user_id: &str) -> Result<Profile> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM profiles WHERE user_id = ?1"),
        params![user_id],
        from_row,
    )
    .optional()?
    .ok_or_else(|| MarketError::ProfileNotFound(user_id.to_string()))
}

pub fn set_verification(
    conn: &Connection,
    id: &str,
    status: VerificationStatus,
    now: DateTime<Utc>,
) -> Result<Profile> {
    let changes = conn.execute(
        "UPDATE profiles SET verification_status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), fmt_dt(now)],
    )?;
    if changes == 0 {
        return Err(MarketError::ProfileNotFound(id.to_string()));
    }
    get(conn, id)
}

pub fn increment_completed(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<()> {
    let changes = conn.execute(
        "UPDATE profiles SET completed_tasks = completed_tasks + 1, updated_at = ?2 WHERE id = ?1",
        params![id, fmt_dt(now)],
    )?;
    if changes == 0 {
        return Err(MarketError::ProfileNotFound(id.to_string()));
    }
    Ok(())
}
