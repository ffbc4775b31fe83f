use crate::types::event::EventId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A materialized read model row, keyed by `(projection_type, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProjection {
    #[serde(rename = "type")]
    pub projection_type: String,
    pub id: String,
    pub data: Value,
    /// Id of the last event folded into `data`.
    pub last_event_id: EventId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
