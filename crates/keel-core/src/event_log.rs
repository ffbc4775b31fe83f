//! Event log trait
//!
//! Defines the read/write contract of the append-only event table. Event ids
//! are assigned by the backend, strictly increase, and define read order.

use crate::error::{KeelError, Result};
use crate::filter::Filter;
use crate::types::{EventId, NewEvent, StoredEvent, StreamSpec};

/// Append-only event storage backend
///
/// Implementations must make `append_batch` all-or-nothing and must execute
/// `append_if_no_newer` as a single atomic statement.
pub trait EventLog: Send + Sync {
    /// Append one event and return its persisted form
    fn append(&self, event: &NewEvent) -> Result<StoredEvent> {
        self.append_batch(std::slice::from_ref(event))?
            .pop()
            .ok_or_else(|| KeelError::Internal("append returned no rows".into()))
    }

    /// Append several events in one transaction, in the given order
    fn append_batch(&self, events: &[NewEvent]) -> Result<Vec<StoredEvent>>;

    /// Highest-id event of `event_type` matching `filter`
    fn latest(&self, event_type: &str, filter: Option<&Filter>) -> Result<Option<StoredEvent>>;

    /// Events of one stream, ascending by id, optionally only those after `after`
    fn stream(&self, spec: &StreamSpec, after: Option<EventId>) -> Result<Vec<StoredEvent>> {
        self.streams(std::slice::from_ref(spec), after)
    }

    /// Union of several streams, ascending by id, each event at most once
    fn streams(&self, specs: &[StreamSpec], after: Option<EventId>) -> Result<Vec<StoredEvent>>;

    /// Append `events` only if no event with id > `latest_event_id` matches
    /// any of `specs`.
    ///
    /// Fails with `ConcurrencyConflict` when such an event exists; nothing is
    /// written in that case.
    fn append_if_no_newer(
        &self,
        events: &[NewEvent],
        latest_event_id: EventId,
        specs: &[StreamSpec],
    ) -> Result<Vec<StoredEvent>>;
}
