//! # Database
//!
//! SQLite database wrapper.
//!
//! ```text
//! ┌─────────────────┐
//! │    Services     │  community / events / generation / claims ...
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │    Database     │  High-level API, one `impl` block per area
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │    rusqlite     │  Single connection behind a mutex
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │   SQLite DB     │  In-memory for tests, file (WAL) in production
//! └─────────────────┘
//! ```

use parking_lot::Mutex;
use rusqlite::{params, Connection, Transaction};
use std::sync::Arc;

use super::schema;
use crate::error::{Error, Result};

/// Database configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Path to the database file (None for in-memory)
    pub path: Option<String>,
}

/// The main database handle
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Database {
    pub(super) conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => {
                let conn = Connection::open(p)
                    .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;
                let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get(0)
                })?;
                conn
            }
            None => Connection::open_in_memory().map_err(|e| {
                Error::Database(format!("Failed to create in-memory database: {}", e))
            })?,
        };
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open using a [`DatabaseConfig`].
    pub fn open_with(config: &DatabaseConfig) -> Result<Self> {
        Self::open(config.path.as_deref())
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::Database(format!("Failed to create tables: {}", e)))?;
                conn.execute_batch(schema::MIGRATE_V1_TO_V2)
                    .map_err(|e| Error::Database(format!("Failed to create tables: {}", e)))?;
                conn.execute_batch(schema::MIGRATE_V2_TO_V3)
                    .map_err(|e| Error::Database(format!("Failed to create tables: {}", e)))?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v < schema::SCHEMA_VERSION => {
                tracing::info!(
                    "Database schema version {} is older than current {}, running migrations",
                    v,
                    schema::SCHEMA_VERSION
                );

                if v < 2 {
                    tracing::info!("Running migration v1 → v2 (generation outbox)");
                    conn.execute_batch(schema::MIGRATE_V1_TO_V2)
                        .map_err(|e| Error::Database(format!("Migration v1→v2 failed: {}", e)))?;
                }

                if v < 3 {
                    tracing::info!("Running migration v2 → v3 (outbox dispatch lease)");
                    conn.execute_batch(schema::MIGRATE_V2_TO_V3)
                        .map_err(|e| Error::Database(format!("Migration v2→v3 failed: {}", e)))?;
                }

                conn.execute(
                    "UPDATE schema_version SET version = ?",
                    params![schema::SCHEMA_VERSION],
                )?;
                tracing::info!(
                    "All migrations complete (now at version {})",
                    schema::SCHEMA_VERSION
                );
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    /// Run `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Current schema version (for diagnostics).
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })?)
    }
}

/// Map `QueryReturnedNoRows` to `None`.
pub(super) fn optional<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
