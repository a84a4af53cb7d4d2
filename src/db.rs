//! SQLite handle shared by every store.

use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

const MIGRATIONS: &[(&str, &str)] = &[
    ("001_init", include_str!("../migrations/001_init.sql")),
    ("002_user_profiles", include_str!("../migrations/002_user_profiles.sql")),
];

/// Errors surfaced by the record stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// A dangling foreign key becomes `NotFound`, any other constraint failure
    /// `Conflict`; everything else passes through.
    pub fn from_insert(err: rusqlite::Error, what: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                StoreError::NotFound
            }
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                StoreError::Conflict(format!("{what} already exists"))
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open database")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;

        for (name, sql) in MIGRATIONS {
            conn.execute_batch(sql)
                .with_context(|| format!("apply migration {name}"))?;
        }
        info!(migrations = MIGRATIONS.len(), "Database schema ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Exclusive access to the connection. Callers keep the guard for one
    /// statement or one transaction, never across unrelated awaits.
    pub async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("database ping")?;
        Ok(())
    }
}
