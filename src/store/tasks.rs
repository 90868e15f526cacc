use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{MarketError, Result};
use crate::geo::GeoPoint;
use crate::model::{Mode, Status, Task};
use crate::store::{dt_col, dt_col_opt, fmt_dt, label_col, new_id};

const COLUMNS: &str = "id, client_id, title, description, status, budget, mode, is_nearby, \
                       latitude, longitude, address_text, created_at, updated_at, started_at, \
                       completed_at";

/// Fields a client supplies when posting a task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub budget: i64,
    pub mode: Mode,
    pub is_nearby: bool,
    pub location: Option<GeoPoint>,
    pub address_text: Option<String>,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let latitude: Option<f64> = row.get(8)?;
    let longitude: Option<f64> = row.get(9)?;
    Ok(Task {
        id: row.get(0)?,
        client_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: label_col(row, 4)?,
        budget: row.get(5)?,
        mode: label_col(row, 6)?,
        is_nearby: row.get(7)?,
        location: latitude.zip(longitude).map(|(lat, lng)| GeoPoint::new(lat, lng)),
        address_text: row.get(10)?,
        created_at: dt_col(row, 11)?,
        updated_at: dt_col(row, 12)?,
        started_at: dt_col_opt(row, 13)?,
        completed_at: dt_col_opt(row, 14)?,
    })
}

pub fn insert(conn: &Connection, client_id: &str, new: &NewTask, now: DateTime<Utc>) -> Result<Task> {
    let id = new_id();
    let ts = fmt_dt(now);
    conn.execute(
        "INSERT INTO tasks (id, client_id, title, description, status, budget, mode, is_nearby,
                            latitude, longitude, address_text, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'open', ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            &id,
            client_id,
            &new.title,
            &new.description,
            new.budget,
            new.mode.as_str(),
            new.is_nearby,
            new.location.map(|p| p.latitude),
            new.location.map(|p| p.longitude),
            &new.address_text,
            &ts,
        ],
    )?;
    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> Result<Task> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()?
    .ok_or_else(|| MarketError::TaskNotFound(id.to_string()))
}

/// List tasks, newest first, optionally filtered by status.
pub fn list(conn: &Connection, status: Option<Status>) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM tasks
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC, id"
    ))?;
    let rows = stmt.query_map(params![status.map(Status::as_str)], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Open tasks flagged as nearby that carry a location.
pub fn list_open_nearby(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM tasks
         WHERE status = 'open' AND is_nearby = 1
           AND latitude IS NOT NULL AND longitude IS NOT NULL"
    ))?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Conditionally move a task from `from` to `to`.
///
/// Returns `false` when the stored status no longer equals `from`, leaving the
/// row untouched. Entering `in_progress` stamps `started_at`; entering
/// `completed` stamps `completed_at`.
pub fn compare_and_set_status(
    conn: &Connection,
    id: &str,
    from: Status,
    to: Status,
    now: DateTime<Utc>,
) -> Result<bool> {
    let ts = fmt_dt(now);
    let changes = conn.execute(
        "UPDATE tasks SET
            status = ?3,
            updated_at = ?4,
            started_at = CASE WHEN ?3 = 'in_progress' THEN ?4 ELSE started_at END,
            completed_at = CASE WHEN ?3 = 'completed' THEN ?4 ELSE completed_at END
         WHERE id = ?1 AND status = ?2",
        params![id, from.as_str(), to.as_str(), &ts],
    )?;
    Ok(changes == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Role, VerificationStatus};
    use crate::store::{MarketDb, profiles};

    fn client(db: &MarketDb) -> String {
        profiles::insert(
            db.conn(),
            "client-user",
            Role::Client,
            None,
            VerificationStatus::None,
            Utc::now(),
        )
        .unwrap()
        .id
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.into(),
            description: Some("bring a ladder".into()),
            budget: 40_000,
            mode: Mode::Immediate,
            is_nearby: false,
            location: None,
            address_text: None,
        }
    }

    #[test]
    fn insert_starts_open() {
        let db = MarketDb::open_memory().unwrap();
        let client_id = client(&db);
        let task = insert(db.conn(), &client_id, &new_task("Hang shelves"), Utc::now()).unwrap();
        assert_eq!(task.status, Status::Open);
        assert_eq!(task.mode, Mode::Immediate);
        assert_eq!(task.client_id, client_id);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn unknown_client_violates_foreign_key() {
        let db = MarketDb::open_memory().unwrap();
        let err = insert(db.conn(), "nobody", &new_task("x"), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "db_error");
    }

    #[test]
    fn cas_only_applies_on_matching_status() {
        let db = MarketDb::open_memory().unwrap();
        let client_id = client(&db);
        let task = insert(db.conn(), &client_id, &new_task("t"), Utc::now()).unwrap();

        assert!(!compare_and_set_status(db.conn(), &task.id, Status::Assigned, Status::InProgress, Utc::now()).unwrap());
        assert!(compare_and_set_status(db.conn(), &task.id, Status::Open, Status::Assigned, Utc::now()).unwrap());
        assert!(!compare_and_set_status(db.conn(), &task.id, Status::Open, Status::Assigned, Utc::now()).unwrap());
        assert_eq!(get(db.conn(), &task.id).unwrap().status, Status::Assigned);
    }

    #[test]
    fn cas_stamps_lifecycle_timestamps() {
        let db = MarketDb::open_memory().unwrap();
        let client_id = client(&db);
        let task = insert(db.conn(), &client_id, &new_task("t"), Utc::now()).unwrap();
        let conn = db.conn();

        compare_and_set_status(conn, &task.id, Status::Open, Status::Assigned, Utc::now()).unwrap();
        compare_and_set_status(conn, &task.id, Status::Assigned, Status::InProgress, Utc::now()).unwrap();
        let started = get(conn, &task.id).unwrap();
        assert!(started.started_at.is_some());
        assert!(started.completed_at.is_none());

        compare_and_set_status(conn, &task.id, Status::InProgress, Status::Review, Utc::now()).unwrap();
        compare_and_set_status(conn, &task.id, Status::Review, Status::Completed, Utc::now()).unwrap();
        let done = get(conn, &task.id).unwrap();
        assert_eq!(done.started_at, started.started_at);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn list_filters_by_status_and_nearby() {
        let db = MarketDb::open_memory().unwrap();
        let client_id = client(&db);
        let conn = db.conn();
        let plain = insert(conn, &client_id, &new_task("plain"), Utc::now()).unwrap();
        let mut nearby = new_task("nearby");
        nearby.is_nearby = true;
        nearby.location = Some(GeoPoint::new(12.97, 77.59));
        let nearby = insert(conn, &client_id, &nearby, Utc::now()).unwrap();
        compare_and_set_status(conn, &plain.id, Status::Open, Status::Cancelled, Utc::now()).unwrap();

        assert_eq!(list(conn, None).unwrap().len(), 2);
        let open = list(conn, Some(Status::Open)).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, nearby.id);

        let candidates = list_open_nearby(conn).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, Some(GeoPoint::new(12.97, 77.59)));
    }
}
