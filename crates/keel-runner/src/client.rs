//! Async event client
//!
//! Wraps a synchronous store (`EventLog + ProjectionStore`) and runs every
//! storage call on tokio's blocking pool, so callers can await many
//! independent operations concurrently. Events are typed by a
//! [`DomainEvent`] union: raw input is parsed against it before any storage
//! call, and rows read back are decoded into it.

use keel_core::{
    error::{KeelError, Result},
    DomainEvent, EventId, EventLog, Filter, NewEvent, ProjectionStore, Recorded, StoredEvent,
    StoredProjection, StreamSpec,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// A projection row with its data decoded into `T`
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub projection_type: String,
    pub id: String,
    pub data: T,
    pub last_event_id: EventId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T: DeserializeOwned> Snapshot<T> {
    /// Decode stored data; a mismatch with `T` is a validation error
    pub fn decode(row: StoredProjection) -> Result<Self> {
        let data = serde_json::from_value(row.data).map_err(|e| {
            KeelError::Validation(format!(
                "projection {}/{}: {}",
                row.projection_type, row.id, e
            ))
        })?;
        Ok(Self {
            projection_type: row.projection_type,
            id: row.id,
            data,
            last_event_id: row.last_event_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Typed async handle over a shared store
pub struct EventClient<E, S> {
    store: Arc<S>,
    _events: PhantomData<fn() -> E>,
}

impl<E, S> Clone for EventClient<E, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _events: PhantomData,
        }
    }
}

fn validate_specs(specs: &[StreamSpec]) -> Result<()> {
    for filter in specs.iter().filter_map(StreamSpec::filter) {
        filter.validate()?;
    }
    Ok(())
}

fn to_json<T: Serialize>(data: &T) -> Result<serde_json::Value> {
    serde_json::to_value(data).map_err(|e| KeelError::Serialization(e.to_string()))
}

fn decode_all<E: DomainEvent>(rows: Vec<StoredEvent>) -> Result<Vec<Recorded<E>>> {
    rows.into_iter().map(Recorded::decode).collect()
}

impl<E, S> EventClient<E, S>
where
    E: DomainEvent,
    S: EventLog + ProjectionStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _events: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Same store, different event union
    pub fn with_events<F: DomainEvent>(&self) -> EventClient<F, S> {
        EventClient::new(Arc::clone(&self.store))
    }

    /// Run a storage call on the blocking pool
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| KeelError::Internal(format!("Task join error: {}", e)))?
    }

    /// Encode typed events, checking each one reads back as `E`
    ///
    /// Values without a faithful JSON form (a NaN float becomes `null`)
    /// fail here with `Validation` instead of being written unreadable.
    fn encode(events: &[E]) -> Result<Vec<NewEvent>> {
        let raw = events
            .iter()
            .map(DomainEvent::to_new_event)
            .collect::<Result<Vec<_>>>()?;
        Self::parse_raw(&raw)?;
        Ok(raw)
    }

    /// Parse raw input against the event union; nothing is written on failure
    fn parse_raw(events: &[NewEvent]) -> Result<()> {
        for event in events {
            E::from_raw(&event.event_type, &event.data)?;
        }
        Ok(())
    }

    pub async fn append(&self, event: &E) -> Result<Recorded<E>> {
        let raw = event.to_new_event()?;
        Self::parse_raw(std::slice::from_ref(&raw))?;
        let stored = self.run(move |s| s.append(&raw)).await?;
        Recorded::decode(stored)
    }

    /// Append untyped input after checking it against `E`
    pub async fn append_raw(&self, event: NewEvent) -> Result<Recorded<E>> {
        Self::parse_raw(std::slice::from_ref(&event))?;
        let stored = self.run(move |s| s.append(&event)).await?;
        Recorded::decode(stored)
    }

    /// Append all events in one transaction
    pub async fn append_batch(&self, events: &[E]) -> Result<Vec<Recorded<E>>> {
        let raw = Self::encode(events)?;
        let stored = self.run(move |s| s.append_batch(&raw)).await?;
        decode_all(stored)
    }

    pub async fn append_batch_raw(&self, events: Vec<NewEvent>) -> Result<Vec<Recorded<E>>> {
        Self::parse_raw(&events)?;
        let stored = self.run(move |s| s.append_batch(&events)).await?;
        decode_all(stored)
    }

    /// Highest-id event of `event_type` matching `filter`
    pub async fn latest(
        &self,
        event_type: &str,
        filter: Option<Filter>,
    ) -> Result<Option<Recorded<E>>> {
        if let Some(filter) = &filter {
            filter.validate()?;
        }
        let event_type = event_type.to_string();
        let stored = self
            .run(move |s| s.latest(&event_type, filter.as_ref()))
            .await?;
        stored.map(Recorded::decode).transpose()
    }

    pub async fn stream(&self, spec: StreamSpec, after: Option<EventId>) -> Result<Vec<Recorded<E>>> {
        self.streams(vec![spec], after).await
    }

    /// Union of streams in id order, each event once
    pub async fn streams(
        &self,
        specs: Vec<StreamSpec>,
        after: Option<EventId>,
    ) -> Result<Vec<Recorded<E>>> {
        validate_specs(&specs)?;
        let stored = self.run(move |s| s.streams(&specs, after)).await?;
        decode_all(stored)
    }

    /// Optimistic append: fails with `ConcurrencyConflict` if any event newer
    /// than `latest_event_id` matches one of `specs`
    pub async fn append_if_no_newer(
        &self,
        events: &[E],
        latest_event_id: EventId,
        specs: Vec<StreamSpec>,
    ) -> Result<Vec<Recorded<E>>> {
        validate_specs(&specs)?;
        let raw = Self::encode(events)?;
        let stored = self
            .run(move |s| s.append_if_no_newer(&raw, latest_event_id, &specs))
            .await?;
        decode_all(stored)
    }

    pub async fn get_projection<T>(&self, projection_type: &str, id: &str) -> Result<Option<Snapshot<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (projection_type, id) = (projection_type.to_string(), id.to_string());
        let row = self
            .run(move |s| s.get_projection(&projection_type, &id))
            .await?;
        row.map(Snapshot::decode).transpose()
    }

    pub async fn query_projections<T>(
        &self,
        projection_type: &str,
        filter: Option<Filter>,
    ) -> Result<Vec<Snapshot<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if let Some(filter) = &filter {
            filter.validate()?;
        }
        let projection_type = projection_type.to_string();
        let rows = self
            .run(move |s| s.query_projections(&projection_type, filter.as_ref()))
            .await?;
        rows.into_iter().map(Snapshot::decode).collect()
    }

    /// Unconditional upsert of data and `last_event_id`
    pub async fn save_projection<T: Serialize>(
        &self,
        projection_type: &str,
        id: &str,
        data: &T,
        event_id: EventId,
    ) -> Result<()> {
        let data = to_json(data)?;
        let (projection_type, id) = (projection_type.to_string(), id.to_string());
        self.run(move |s| s.save_projection(&projection_type, &id, &data, event_id))
            .await
    }

    /// Replace data, leaving `last_event_id` untouched
    pub async fn force_update_projection<T: Serialize>(
        &self,
        projection_type: &str,
        id: &str,
        data: &T,
    ) -> Result<()> {
        let data = to_json(data)?;
        let (projection_type, id) = (projection_type.to_string(), id.to_string());
        self.run(move |s| s.force_update_projection(&projection_type, &id, &data))
            .await
    }

    /// Upsert only if `event_id` is newer than the stored snapshot
    pub async fn conditional_update_projection<T: Serialize>(
        &self,
        projection_type: &str,
        id: &str,
        data: &T,
        event_id: EventId,
    ) -> Result<()> {
        let data = to_json(data)?;
        let (projection_type, id) = (projection_type.to_string(), id.to_string());
        self.run(move |s| s.conditional_update_projection(&projection_type, &id, &data, event_id))
            .await
    }
}
