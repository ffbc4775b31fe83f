//! Runners: async access, projection folding and pre-write validation
//!
//! Builds on the synchronous `keel-core` storage traits:
//! - [`EventClient`]: typed async surface, storage calls on the blocking pool
//! - [`ProjectionRunner`]: resumable fold of streams into a snapshot
//! - [`ValidationRunner`]: read, check a rule, then conditionally append
//!
//! Both runners memoize what they read. A runner instance never observes
//! newer data until it is refreshed.

pub mod client;
pub mod history;
pub mod projection;
pub mod validator;

pub use client::{EventClient, Snapshot};
pub use history::{EventHistory, EventView};
pub use projection::{Projection, ProjectionRunner, RunnerOptions};
pub use validator::{ValidationRunner, Validator};
