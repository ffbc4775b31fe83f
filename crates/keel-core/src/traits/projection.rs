use crate::error::Result;
use crate::filter::Filter;
use crate::types::{EventId, StoredProjection};
use serde_json::Value;

/// Projection table: keyed, mutable materialized views
///
/// Rows are keyed by `(projection_type, id)` and remember the id of the last
/// event folded into them. Three write modes:
/// - `save_projection`: unconditional upsert
/// - `force_update_projection`: replace data, keep `last_event_id`
/// - `conditional_update_projection`: upsert only if `event_id` moves forward
pub trait ProjectionStore: Send + Sync {
    /// Get a single projection row
    fn get_projection(&self, projection_type: &str, id: &str) -> Result<Option<StoredProjection>>;

    /// All rows of a projection type whose data matches `filter`
    fn query_projections(
        &self,
        projection_type: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<StoredProjection>>;

    /// Create or overwrite a row, setting both data and `last_event_id`
    fn save_projection(
        &self,
        projection_type: &str,
        id: &str,
        data: &Value,
        event_id: EventId,
    ) -> Result<()>;

    /// Replace data without touching `last_event_id`
    ///
    /// Fails with `NotFound` if the row does not exist.
    fn force_update_projection(&self, projection_type: &str, id: &str, data: &Value)
        -> Result<()>;

    /// Upsert that only takes effect when `event_id` is strictly greater than
    /// the stored `last_event_id`
    ///
    /// Fails with `ConcurrencyConflict` otherwise, equality included.
    fn conditional_update_projection(
        &self,
        projection_type: &str,
        id: &str,
        data: &Value,
        event_id: EventId,
    ) -> Result<()>;
}
