//! Unified keel database interface
//!
//! Provides a single entry point that owns the SQLite store and hands out
//! typed clients and runners sharing it.

use crate::{
    DomainEvent, EventClient, Projection, ProjectionRunner, Result, RunnerOptions, SqliteStore,
    StoreConfig, ValidationRunner, Validator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the store inside a database directory
pub const EVENTS_FILE: &str = "events.db";

/// Client type handed out by [`KeelDb::client`]
pub type Client<E> = EventClient<E, SqliteStore>;

/// Unified keel database
///
/// Cheap to clone; every clone, client and runner shares one connection.
#[derive(Clone)]
pub struct KeelDb {
    store: Arc<SqliteStore>,
    base_path: Option<PathBuf>,
}

impl KeelDb {
    /// Open a keel database in the given directory
    ///
    /// Creates the directory if needed and stores everything in
    /// `{path}/events.db`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;

        let mut db = Self::open_with_config(StoreConfig::new(base_path.join(EVENTS_FILE)))?;
        db.base_path = Some(base_path);
        Ok(db)
    }

    /// Open with a custom store configuration
    pub fn open_with_config(config: StoreConfig) -> Result<Self> {
        let base_path = config
            .path
            .as_ref()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf);
        let store = Arc::new(SqliteStore::open(config)?);

        tracing::info!(
            path = ?store.config().path,
            schema_version = store.schema_version()?,
            "Opened keel database"
        );

        Ok(Self { store, base_path })
    }

    /// Open a private in-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Arc::new(SqliteStore::open_in_memory()?),
            base_path: None,
        })
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Directory holding the store file; `None` when in memory
    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Typed async client over this database
    pub fn client<E: DomainEvent>(&self) -> Client<E> {
        EventClient::new(Arc::clone(&self.store))
    }

    pub fn projection_runner<P: Projection>(
        &self,
        projection: P,
        options: RunnerOptions,
    ) -> ProjectionRunner<P, SqliteStore> {
        ProjectionRunner::new(self.client(), projection, options)
    }

    pub fn validation_runner<V: Validator>(&self, validator: V) -> ValidationRunner<V, SqliteStore> {
        ValidationRunner::new(self.client(), validator)
    }

    /// Index a top-level field of event data
    ///
    /// Speeds up filters on `field`; results are the same with or without it.
    pub fn create_event_data_index(&self, field: &str) -> Result<()> {
        self.store.create_event_data_index(field)
    }

    /// Index a top-level field of projection data
    pub fn create_projection_data_index(&self, field: &str) -> Result<()> {
        self.store.create_projection_data_index(field)
    }

    pub fn schema_version(&self) -> Result<u32> {
        self.store.schema_version()
    }
}
