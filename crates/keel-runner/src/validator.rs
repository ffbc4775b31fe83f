//! Validation runner
//!
//! Checks a business rule against the current history of one or more
//! streams, then appends the staged events only if no relevant event was
//! written in between. Losing that race surfaces as `ConcurrencyConflict`;
//! the caller re-runs the whole read-validate-write cycle.

use crate::client::EventClient;
use crate::history::{EventHistory, EventView};
use keel_core::{
    error::Result, DomainEvent, EventLog, ProjectionStore, Recorded, StreamSpec, EMPTY_STREAM,
};

/// A business rule over the events of some streams
pub trait Validator: Send + Sync {
    type Event: DomainEvent;

    /// Streams the rule reads, and that a write must not have raced with
    fn streams(&self) -> Vec<StreamSpec>;

    /// Accept or reject the staged events
    ///
    /// `events` holds committed events followed by staged ones; use
    /// [`EventView::reduce_db`] for rules that must only see committed
    /// history. Reject with `KeelError::InvariantViolation`.
    fn is_valid(&self, events: &EventView<'_, Self::Event>) -> Result<()>;
}

pub struct ValidationRunner<V: Validator, S> {
    client: EventClient<V::Event, S>,
    validator: V,
    history: EventHistory<V::Event>,
}

impl<V, S> ValidationRunner<V, S>
where
    V: Validator,
    S: EventLog + ProjectionStore + 'static,
{
    pub fn new(client: EventClient<V::Event, S>, validator: V) -> Self {
        Self {
            client,
            validator,
            history: EventHistory::new(),
        }
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    /// Full history of the watched streams, then staged events
    pub async fn events(&self) -> Result<EventView<'_, V::Event>> {
        self.history
            .load(|| async {
                let events = self.client.streams(self.validator.streams(), None).await?;
                tracing::debug!(count = events.len(), "Loaded validator events");
                Ok(events)
            })
            .await
    }

    pub async fn get_events(&self) -> Result<Vec<V::Event>> {
        Ok(self.events().await?.iter().cloned().collect())
    }

    pub async fn reduce_events<T>(&self, reducer: impl FnMut(T, &V::Event) -> T, initial: T) -> Result<T> {
        Ok(self.events().await?.reduce(reducer, initial))
    }

    pub async fn reduce_only_db_events<T>(
        &self,
        reducer: impl FnMut(T, &V::Event) -> T,
        initial: T,
    ) -> Result<T> {
        Ok(self.events().await?.reduce_db(reducer, initial))
    }

    /// Stage a candidate event
    pub fn apply(&mut self, event: V::Event) -> &mut Self {
        self.history.stage(event);
        self
    }

    pub fn apply_all(&mut self, events: impl IntoIterator<Item = V::Event>) -> &mut Self {
        for event in events {
            self.history.stage(event);
        }
        self
    }

    /// Re-fetch the watched streams
    pub async fn refresh(&mut self) -> Result<()> {
        self.history.invalidate();
        self.events().await?;
        Ok(())
    }

    /// Run the rule against the current view
    pub async fn is_valid(&self) -> Result<()> {
        let view = self.events().await?;
        self.validator.is_valid(&view)
    }

    /// Validate and conditionally append the staged events
    ///
    /// Returns nothing without touching storage if no events are staged.
    /// The append is guarded by the newest db event this runner has read.
    pub async fn save(&self) -> Result<Vec<Recorded<V::Event>>> {
        let staged = self.history.staged();
        if staged.is_empty() {
            return Ok(Vec::new());
        }

        let view = self.events().await?;
        if let Err(e) = self.validator.is_valid(&view) {
            tracing::warn!(error = %e, staged = staged.len(), "Validation rejected events");
            return Err(e);
        }

        let latest_event_id = view.last_db_id().unwrap_or(EMPTY_STREAM);
        let saved = self
            .client
            .append_if_no_newer(staged, latest_event_id, self.validator.streams())
            .await?;

        tracing::debug!(
            count = saved.len(),
            latest_event_id,
            "Validated events appended"
        );
        Ok(saved)
    }
}
