//! keel prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use keel::prelude::*;
//! ```

// Core types
pub use crate::{
    Client, EventId, KeelDb, KeelError, NewEvent, Recorded, Result, Snapshot, StoredEvent,
    StoredProjection, StreamSpec, EMPTY_STREAM,
};

// Filters
pub use crate::{Comparison, Condition, Filter, Scalar};

// Config
pub use crate::{RunnerOptions, StoreConfig, SynchronousMode};

// Traits
pub use crate::{DomainEvent, EventLog, Projection, ProjectionStore, Validator};

// Clients and runners
pub use crate::{EventClient, EventView, ProjectionRunner, SqliteStore, ValidationRunner};

// Re-export common external deps
pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tracing;
