//! Typed events
//!
//! A domain defines its events as one closed enum keyed by `type`. With the
//! serde adjacently-tagged representation the enum is its own schema:
//!
//! ```
//! use keel_core::schema::DomainEvent;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! #[serde(tag = "type", content = "data")]
//! enum AccountEvent {
//!     #[serde(rename = "OPENED")]
//!     Opened { owner: String },
//!     #[serde(rename = "DEPOSITED")]
//!     Deposited { amount: i64 },
//! }
//!
//! impl DomainEvent for AccountEvent {
//!     fn event_type(&self) -> &str {
//!         match self {
//!             AccountEvent::Opened { .. } => "OPENED",
//!             AccountEvent::Deposited { .. } => "DEPOSITED",
//!         }
//!     }
//! }
//!
//! let raw = serde_json::json!({ "amount": "ten" });
//! assert!(AccountEvent::from_raw("DEPOSITED", &raw).is_err());
//! ```

use crate::error::{KeelError, Result};
use crate::types::{EventId, NewEvent, StoredEvent};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};

/// A closed set of event shapes, tagged by event type
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The `type` tag this value is stored under
    fn event_type(&self) -> &str;

    /// Parse a raw payload into a typed, schema-checked event
    ///
    /// Fails with `Validation` when the payload does not fit the shape
    /// registered for `event_type`, or the type is unknown.
    fn from_raw(event_type: &str, data: &Value) -> Result<Self> {
        let tagged = json!({ "type": event_type, "data": data });
        serde_json::from_value(tagged)
            .map_err(|e| KeelError::Validation(format!("{}: {}", event_type, e)))
    }

    /// Split into the `(type, data)` pair that is written to the log
    fn to_new_event(&self) -> Result<NewEvent> {
        let mut object = match serde_json::to_value(self)? {
            Value::Object(object) => object,
            other => {
                return Err(KeelError::Serialization(format!(
                    "event must serialize as {{\"type\", \"data\"}}, got {}",
                    other
                )))
            }
        };
        let data = object
            .remove("data")
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(NewEvent::new(self.event_type(), data))
    }
}

/// Untyped events: any `type` with any payload
impl DomainEvent for NewEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn to_new_event(&self) -> Result<NewEvent> {
        Ok(self.clone())
    }
}

/// A persisted event decoded into its domain type
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded<E> {
    pub id: EventId,
    pub event: E,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<E: DomainEvent> Recorded<E> {
    pub fn decode(stored: StoredEvent) -> Result<Self> {
        let event = E::from_raw(&stored.event_type, &stored.data)?;
        Ok(Self {
            id: stored.id,
            event,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }
}
