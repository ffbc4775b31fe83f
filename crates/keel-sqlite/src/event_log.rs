//! Event log over the `events` table

use crate::query::{self, EVENT_COLUMNS};
use crate::store::SqliteStore;
use chrono::{DateTime, Utc};
use keel_core::{
    error::{KeelError, Result},
    observe, EventId, EventLog, Filter, NewEvent, StoredEvent, StreamSpec,
};
use rusqlite::{params, params_from_iter, types::Type, OptionalExtension, Row, TransactionBehavior};
use std::time::Instant;

/// Parse a stored RFC 3339 timestamp column
pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map a row selected with [`EVENT_COLUMNS`]
fn event_from_row(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    Ok(StoredEvent {
        id: row.get(0)?,
        event_type: row.get(1)?,
        data: row.get(2)?,
        created_at: timestamp(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

impl EventLog for SqliteStore {
    fn append_batch(&self, events: &[NewEvent]) -> Result<Vec<StoredEvent>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(KeelError::storage)?;

        let mut stored = Vec::with_capacity(events.len());
        {
            let mut stmt = tx
                .prepare_cached(&format!(
                    "INSERT INTO events (type, data) VALUES (?1, ?2) RETURNING {}",
                    EVENT_COLUMNS
                ))
                .map_err(KeelError::storage)?;

            for event in events {
                let row = stmt
                    .query_row(params![event.event_type, event.data.to_string()], event_from_row)
                    .map_err(KeelError::storage)?;
                stored.push(row);
            }
        }

        // Dropping `tx` without commit rolls the whole batch back
        tx.commit().map_err(KeelError::storage)?;

        observe::record_append(start.elapsed(), stored.len(), false);
        tracing::debug!(
            count = stored.len(),
            first_id = stored.first().map(|e| e.id),
            "Appended events"
        );
        Ok(stored)
    }

    fn latest(&self, event_type: &str, filter: Option<&Filter>) -> Result<Option<StoredEvent>> {
        let query = query::select_latest(event_type, filter)?;
        let start = Instant::now();

        let conn = self.conn()?;
        let event = conn
            .prepare_cached(&query.sql)
            .and_then(|mut stmt| {
                stmt.query_row(params_from_iter(query.params.iter()), event_from_row)
                    .optional()
            })
            .map_err(KeelError::storage)?;

        observe::record_query(start.elapsed(), usize::from(event.is_some()));
        Ok(event)
    }

    fn streams(&self, specs: &[StreamSpec], after: Option<EventId>) -> Result<Vec<StoredEvent>> {
        let query = query::select_streams(specs, after)?;
        if specs.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&query.sql).map_err(KeelError::storage)?;
        let events = stmt
            .query_map(params_from_iter(query.params.iter()), event_from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(KeelError::storage)?;

        observe::record_query(start.elapsed(), events.len());
        tracing::debug!(
            streams = specs.len(),
            after = ?after,
            count = events.len(),
            "Read event streams"
        );
        Ok(events)
    }

    fn append_if_no_newer(
        &self,
        events: &[NewEvent],
        latest_event_id: EventId,
        specs: &[StreamSpec],
    ) -> Result<Vec<StoredEvent>> {
        let streams = query::compile_streams(specs)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let sql = query::conditional_insert(events.len(), &streams);
        let mut bound: Vec<rusqlite::types::Value> = Vec::with_capacity(events.len() * 2 + 1);
        for event in events {
            bound.push(event.event_type.clone().into());
            bound.push(event.data.to_string().into());
        }
        bound.push(latest_event_id.into());
        bound.extend(streams.params);

        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock before the statement reads, so a
        // writer on another connection waits instead of failing mid-statement.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(KeelError::storage)?;

        let mut inserted = {
            let mut stmt = tx.prepare(&sql).map_err(KeelError::storage)?;
            let rows = stmt
                .query_map(params_from_iter(bound.iter()), event_from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(KeelError::storage)?;
            rows
        };

        if inserted.is_empty() {
            // Nothing was written; dropping the transaction rolls it back
            observe::record_conflict("events");
            tracing::warn!(
                latest_event_id,
                streams = specs.len(),
                "Conditional append rejected: newer events in stream"
            );
            return Err(KeelError::ConcurrencyConflict(format!(
                "events newer than {} exist in the watched streams",
                latest_event_id
            )));
        }

        tx.commit().map_err(KeelError::storage)?;

        inserted.sort_by_key(|e| e.id);
        observe::record_append(start.elapsed(), inserted.len(), true);
        tracing::debug!(
            count = inserted.len(),
            latest_event_id,
            "Conditionally appended events"
        );
        Ok(inserted)
    }
}
