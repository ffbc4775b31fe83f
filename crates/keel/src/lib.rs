//! keel: an event-sourcing storage engine on SQLite
//!
//! keel provides:
//! - **Event log**: append-only, totally ordered by a store-assigned id
//! - **Streams**: event-type sets with a JSON field filter, read in id order
//! - **Conditional append**: write only if no newer event matches the streams read
//! - **Projections**: keyed JSON snapshots with unconditional, forced and
//!   forward-only writes
//! - **Runners**: fold streams into read models, validate business rules
//!   before an optimistic append
//!
//! # Quick Start
//!
//! ```no_run
//! use keel::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> Result<()> {
//! let db = KeelDb::open("./data")?;
//! let client = db.client::<NewEvent>();
//!
//! client
//!     .append(&NewEvent::new("OPENED", json!({ "account": "a1" })))
//!     .await?;
//!
//! let opened = client
//!     .stream(
//!         StreamSpec::new(["OPENED"]).with_filter(Filter::new().eq("account", "a1")),
//!         None,
//!     )
//!     .await?;
//! assert_eq!(opened.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod prelude;

// Re-export core types
pub use keel_core::{
    config::{StoreConfig, SynchronousMode},
    error::{KeelError, Result},
    filter::{Comparison, Condition, FieldFilter, Filter, Scalar, ScalarKind},
    schema::{DomainEvent, Recorded},
    traits::ProjectionStore,
    types::{EventId, NewEvent, StoredEvent, StoredProjection, StreamSpec, EMPTY_STREAM},
    EventLog,
};

// Re-export implementations
pub use keel_runner::{
    EventClient, EventHistory, EventView, Projection, ProjectionRunner, RunnerOptions, Snapshot,
    ValidationRunner, Validator,
};
pub use keel_sqlite::{SqliteStore, SCHEMA_VERSION};

pub use db::{Client, KeelDb};
