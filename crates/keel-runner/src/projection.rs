//! Projection runner
//!
//! Folds one stream (or a union of streams) into a read model and persists
//! it as a snapshot. With `load_existing` the runner resumes from the stored
//! snapshot and only fetches events newer than it.

use crate::client::{EventClient, Snapshot};
use crate::history::{EventHistory, EventView};
use keel_core::{
    error::{KeelError, Result},
    DomainEvent, EventId, EventLog, ProjectionStore, StreamSpec, EMPTY_STREAM,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::OnceCell;

/// A read model derived from events
///
/// A single-stream projection returns one spec from [`Projection::streams`];
/// a multi-stream projection returns several. Both run on [`ProjectionRunner`].
pub trait Projection: Send + Sync {
    type Event: DomainEvent;
    type State: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Projection type, the first half of the storage key
    fn projection_type(&self) -> &str;

    /// Projection id, the second half of the storage key
    fn id(&self) -> &str;

    fn streams(&self) -> Vec<StreamSpec>;

    /// State to fold from when there is no snapshot
    fn initial_state(&self) -> Self::State;

    fn fold(&self, state: Self::State, event: &Self::Event) -> Self::State;

    /// Extra checks on the folded state before it is saved
    fn check(&self, _state: &Self::State) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerOptions {
    /// Resume from the stored snapshot instead of folding from scratch
    #[serde(default)]
    pub load_existing: bool,
}

impl RunnerOptions {
    pub fn load_existing() -> Self {
        Self {
            load_existing: true,
        }
    }
}

pub struct ProjectionRunner<P: Projection, S> {
    client: EventClient<P::Event, S>,
    projection: P,
    options: RunnerOptions,
    snapshot: OnceCell<Option<Snapshot<P::State>>>,
    history: EventHistory<P::Event>,
}

impl<P, S> ProjectionRunner<P, S>
where
    P: Projection,
    S: EventLog + ProjectionStore + 'static,
{
    pub fn new(client: EventClient<P::Event, S>, projection: P, options: RunnerOptions) -> Self {
        Self {
            client,
            projection,
            options,
            snapshot: OnceCell::new(),
            history: EventHistory::new(),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Stored snapshot, or `None` if `load_existing` is off or no row exists
    pub async fn existing(&self) -> Result<Option<&Snapshot<P::State>>> {
        let snapshot = self
            .snapshot
            .get_or_try_init(|| async {
                if !self.options.load_existing {
                    return Ok(None);
                }
                self.client
                    .get_projection::<P::State>(self.projection.projection_type(), self.projection.id())
                    .await
            })
            .await?;
        Ok(snapshot.as_ref())
    }

    pub async fn existing_state(&self) -> Result<Option<&P::State>> {
        Ok(self.existing().await?.map(|s| &s.data))
    }

    /// Resume point: the snapshot's `last_event_id`, if there is one
    async fn resume_after(&self) -> Result<Option<EventId>> {
        Ok(self
            .existing()
            .await?
            .map(|s| s.last_event_id)
            .filter(|id| *id > EMPTY_STREAM))
    }

    /// Db events after the resume point, then staged events
    pub async fn events(&self) -> Result<EventView<'_, P::Event>> {
        self.history
            .load(|| async {
                let after = self.resume_after().await?;
                let events = self.client.streams(self.projection.streams(), after).await?;
                tracing::debug!(
                    projection_type = self.projection.projection_type(),
                    id = self.projection.id(),
                    after = ?after,
                    count = events.len(),
                    "Loaded projection events"
                );
                Ok(events)
            })
            .await
    }

    pub async fn get_events(&self) -> Result<Vec<P::Event>> {
        Ok(self.events().await?.iter().cloned().collect())
    }

    pub async fn reduce_events<T>(&self, reducer: impl FnMut(T, &P::Event) -> T, initial: T) -> Result<T> {
        Ok(self.events().await?.reduce(reducer, initial))
    }

    pub async fn reduce_only_db_events<T>(
        &self,
        reducer: impl FnMut(T, &P::Event) -> T,
        initial: T,
    ) -> Result<T> {
        Ok(self.events().await?.reduce_db(reducer, initial))
    }

    /// Stage an event for what-if folding; it is never persisted
    pub fn apply(&mut self, event: P::Event) -> &mut Self {
        self.history.stage(event);
        self
    }

    pub fn apply_all(&mut self, events: impl IntoIterator<Item = P::Event>) -> &mut Self {
        for event in events {
            self.history.stage(event);
        }
        self
    }

    /// Drop both caches and reload the snapshot
    ///
    /// The next read fetches only events after the refreshed snapshot.
    pub async fn refresh(&mut self) -> Result<()> {
        self.snapshot.take();
        self.history.invalidate();
        self.existing().await?;
        Ok(())
    }

    /// Fold snapshot state (or the initial state) over all events
    pub async fn as_json(&self) -> Result<P::State> {
        let start = match self.existing_state().await? {
            Some(state) => state.clone(),
            None => self.projection.initial_state(),
        };
        let view = self.events().await?;
        Ok(view.reduce(|state, event| self.projection.fold(state, event), start))
    }

    /// Persist the folded state and return the event id it is anchored at
    ///
    /// Fails with `AppliedEventsPresent` if events are staged and with
    /// `NoEventsToSave` if there are no db events and no prior snapshot.
    pub async fn save(&self) -> Result<EventId> {
        if !self.history.staged().is_empty() {
            return Err(KeelError::AppliedEventsPresent);
        }

        let last_db_id = self.events().await?.last_db_id();
        let event_id = match last_db_id {
            Some(id) => id,
            None => self.resume_after().await?.ok_or(KeelError::NoEventsToSave)?,
        };

        let state = self.as_json().await?;
        self.projection.check(&state)?;

        let (projection_type, id) = (self.projection.projection_type(), self.projection.id());
        self.client
            .save_projection(projection_type, id, &state, event_id)
            .await?;

        tracing::debug!(projection_type, id, event_id, "Saved projection snapshot");
        Ok(event_id)
    }
}
