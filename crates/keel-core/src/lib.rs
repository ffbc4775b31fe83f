//! Keel Core: types and traits for the keel event store
//!
//! This crate defines the storage-independent pieces of an event-sourcing
//! engine:
//! - Event log contract: append, batch append, latest, stream reads and
//!   conditional (optimistic-concurrency) append
//! - Projection table contract: keyed snapshots with plain, forced and
//!   conditional writes
//! - Filter language over JSON payloads
//! - Typed events: a closed enum per domain that doubles as its schema
//! - The error taxonomy shared by every layer

pub mod config;
pub mod error;
pub mod event_log;
pub mod filter;
pub mod observe;
pub mod schema;
pub mod traits;
pub mod types;

pub use config::{StoreConfig, SynchronousMode};
pub use error::{KeelError, Result};
pub use event_log::EventLog;
pub use filter::{Comparison, Condition, FieldFilter, Filter, Scalar, ScalarKind};
pub use schema::{DomainEvent, Recorded};
pub use traits::ProjectionStore;
pub use types::{EventId, NewEvent, StoredEvent, StoredProjection, StreamSpec, EMPTY_STREAM};
