use std::path::Path;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::Result;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;\
     PRAGMA foreign_keys=ON;\
     PRAGMA busy_timeout=5000;";

#[derive(Debug)]
pub struct MarketDb {
    conn: Connection,
}

impl MarketDb {
    /// Open (or create) the database at the given file path and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Self::connect(path)?;
        db.create_tables()?;
        Ok(db)
    }

    /// Open a connection without touching the schema.
    pub fn connect(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=5000;",
        )?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                full_name TEXT,
                verification_status TEXT NOT NULL DEFAULT 'none',
                completed_tasks INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES profiles(id),
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'open',
                budget INTEGER NOT NULL,
                mode TEXT NOT NULL DEFAULT 'standard',
                is_nearby INTEGER NOT NULL DEFAULT 0,
                latitude REAL,
                longitude REAL,
                address_text TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_status
                ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_client
                ON tasks(client_id);

            CREATE TABLE IF NOT EXISTS task_handshakes (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id),
                freelancer_id TEXT NOT NULL REFERENCES profiles(id),
                accepted_at TEXT NOT NULL,
                is_cancelled INTEGER NOT NULL DEFAULT 0,
                cancelled_reason TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_handshakes_active_task
                ON task_handshakes(task_id) WHERE is_cancelled = 0;

            CREATE TABLE IF NOT EXISTS otps (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id),
                code TEXT NOT NULL,
                otp_type TEXT NOT NULL,
                is_used INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_otps_task_type
                ON otps(task_id, otp_type);

            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL UNIQUE REFERENCES tasks(id),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                actor TEXT,
                event_type TEXT NOT NULL,
                from_status TEXT,
                to_status TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_task_events_task
                ON task_events(task_id);",
        )?;
        Ok(())
    }

    /// Expose the raw connection (for reads and tests).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction that takes the database write lock up front.
    ///
    /// Every multi-row mutation runs inside one of these; dropping the
    /// returned transaction without committing rolls back all of its writes.
    pub fn immediate(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}
