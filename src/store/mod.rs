pub mod chats;
pub mod db;
pub mod events;
pub mod handshakes;
pub mod otps;
pub mod profiles;
pub mod tasks;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use crate::error::{MarketError, Result};
pub use db::MarketDb;

/// Handle to the backing database. Cheap to clone; every call to [`Store::open`]
/// yields an independent connection, so no connection state is shared between
/// requests.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the database file and schema if missing.
    pub fn init(&self) -> Result<MarketDb> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        MarketDb::open(&self.path)
    }

    /// Open a connection against an already-initialized database.
    pub fn open(&self) -> Result<MarketDb> {
        if !self.path.exists() {
            return Err(MarketError::NotInitialized(self.path.clone()));
        }
        MarketDb::connect(&self.path)
    }
}

/// Fixed-width RFC 3339 so TEXT comparisons in SQL order chronologically.
pub(crate) fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn dt_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_dt(idx, &raw)
}

pub(crate) fn dt_col_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_dt(idx, &s)).transpose()
}

fn parse_dt(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a TEXT column holding one of the model's snake_case labels.
pub(crate) fn label_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn label_col_opt<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// True when `err` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fmt_dt_is_fixed_width_and_sortable() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1);
        let (fa, fb) = (fmt_dt(a), fmt_dt(b));
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
        assert_eq!(fa, "2024-01-01T09:00:00.000000Z");
    }

    #[test]
    fn init_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("nested").join("market.db"));
        store.init().unwrap();
        assert!(store.path().exists());
        store.open().unwrap();
    }

    #[test]
    fn open_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("missing.db"));
        assert_eq!(store.open().unwrap_err().code(), "not_initialized");
        assert!(!store.path().exists());
    }
}
