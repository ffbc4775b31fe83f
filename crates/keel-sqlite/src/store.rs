use keel_core::{
    error::{KeelError, Result},
    StoreConfig,
};
use rusqlite::{Connection, OpenFlags};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::schema;

/// SQLite-backed event log and projection table
///
/// One connection behind a mutex. Cloning shares the connection; opening
/// the same file twice gives independent connections that coordinate
/// through SQLite's locking.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl SqliteStore {
    /// Open (or create) a store and initialise its schema
    pub fn open(cfg: StoreConfig) -> Result<Self> {
        let conn = match &cfg.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(KeelError::storage)?
            }
            None => Connection::open_in_memory().map_err(KeelError::storage)?,
        };

        Self::configure_connection(&conn, &cfg)?;
        schema::init_schema(&conn)?;

        tracing::info!(
            path = ?cfg.path,
            wal = cfg.wal_mode,
            "Opened SQLite event store"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: cfg,
        })
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Lock the underlying connection
    ///
    /// For custom queries against the `events` and `projections` tables.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| KeelError::Lock(format!("connection mutex poisoned: {}", e)))
    }

    /// Index a top-level key of event payloads
    pub fn create_event_data_index(&self, field: &str) -> Result<()> {
        let conn = self.conn()?;
        schema::create_data_index(&conn, "events", field)
    }

    /// Index a top-level key of projection payloads
    pub fn create_projection_data_index(&self, field: &str) -> Result<()> {
        let conn = self.conn()?;
        schema::create_data_index(&conn, "projections", field)
    }

    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn()?;
        schema::schema_version(&conn)
    }

    /// Configure SQLite connection
    fn configure_connection(conn: &Connection, cfg: &StoreConfig) -> Result<()> {
        // WAL only applies to file-backed databases
        if cfg.wal_mode && cfg.path.is_some() {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| KeelError::Config(e.to_string()))?;
        }

        conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())
            .map_err(|e| KeelError::Config(e.to_string()))?;

        conn.pragma_update(None, "cache_size", cfg.cache_size)
            .map_err(|e| KeelError::Config(e.to_string()))?;

        conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))
            .map_err(|e| KeelError::Config(e.to_string()))?;

        Ok(())
    }
}
