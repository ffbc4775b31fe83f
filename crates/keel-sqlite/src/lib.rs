//! SQLite-backed event log and projection table
//!
//! Implements the `keel-core` storage traits on a single SQLite database
//! with two tables:
//! - `events`: append-only, ids from `AUTOINCREMENT`, JSON payloads
//! - `projections`: materialized views keyed by `(type, id)`
//!
//! Key features:
//! - Filters compiled to `json_extract` predicates with typed casts
//! - Conditional append as one guarded `INSERT .. SELECT .. RETURNING`
//! - Conditional projection update as one guarded upsert
//! - WAL mode and busy timeout for multi-connection use

pub mod event_log;
pub mod projection;
pub mod query;
pub mod schema;
pub mod store;

pub use schema::SCHEMA_VERSION;
pub use store::SqliteStore;
