//! Projection table over the `projections` table

use crate::event_log::timestamp;
use crate::query::{self, NOW, PROJECTION_COLUMNS};
use crate::store::SqliteStore;
use keel_core::{
    error::{KeelError, Result},
    observe, EventId, Filter, ProjectionStore, StoredProjection,
};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde_json::Value;
use std::time::Instant;

/// Map a row selected with [`PROJECTION_COLUMNS`]
fn projection_from_row(row: &Row<'_>) -> rusqlite::Result<StoredProjection> {
    Ok(StoredProjection {
        projection_type: row.get(0)?,
        id: row.get(1)?,
        data: row.get(2)?,
        last_event_id: row.get(3)?,
        created_at: timestamp(row, 4)?,
        updated_at: timestamp(row, 5)?,
    })
}

impl ProjectionStore for SqliteStore {
    fn get_projection(&self, projection_type: &str, id: &str) -> Result<Option<StoredProjection>> {
        let conn = self.conn()?;
        conn.prepare_cached(&format!(
            "SELECT {} FROM projections WHERE type = ?1 AND id = ?2",
            PROJECTION_COLUMNS
        ))
        .and_then(|mut stmt| {
            stmt.query_row(params![projection_type, id], projection_from_row)
                .optional()
        })
        .map_err(KeelError::storage)
    }

    fn query_projections(
        &self,
        projection_type: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<StoredProjection>> {
        let query = query::select_projections(projection_type, filter)?;
        let start = Instant::now();

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&query.sql).map_err(KeelError::storage)?;
        let rows = stmt
            .query_map(params_from_iter(query.params.iter()), projection_from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(KeelError::storage)?;

        observe::record_query(start.elapsed(), rows.len());
        Ok(rows)
    }

    fn save_projection(
        &self,
        projection_type: &str,
        id: &str,
        data: &Value,
        event_id: EventId,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO projections (type, id, data, latest_event_id) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (type, id) DO UPDATE SET
                     data = excluded.data,
                     latest_event_id = excluded.latest_event_id,
                     updated_at = {}",
                NOW
            ),
            params![projection_type, id, data.to_string(), event_id],
        )
        .map_err(KeelError::storage)?;

        observe::record_projection_write("save");
        tracing::debug!(
            projection_type,
            id,
            event_id,
            "Saved projection"
        );
        Ok(())
    }

    fn force_update_projection(
        &self,
        projection_type: &str,
        id: &str,
        data: &Value,
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                &format!(
                    "UPDATE projections SET data = ?3, updated_at = {} WHERE type = ?1 AND id = ?2",
                    NOW
                ),
                params![projection_type, id, data.to_string()],
            )
            .map_err(KeelError::storage)?;

        if changed == 0 {
            return Err(KeelError::NotFound(format!(
                "projection {}/{}",
                projection_type, id
            )));
        }

        observe::record_projection_write("force");
        tracing::debug!(projection_type, id, "Force-updated projection data");
        Ok(())
    }

    fn conditional_update_projection(
        &self,
        projection_type: &str,
        id: &str,
        data: &Value,
        event_id: EventId,
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                &format!(
                    "INSERT INTO projections (type, id, data, latest_event_id) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (type, id) DO UPDATE SET
                         data = excluded.data,
                         latest_event_id = excluded.latest_event_id,
                         updated_at = {}
                     WHERE excluded.latest_event_id > projections.latest_event_id",
                    NOW
                ),
                params![projection_type, id, data.to_string(), event_id],
            )
            .map_err(KeelError::storage)?;

        if changed == 0 {
            observe::record_conflict("projections");
            tracing::warn!(
                projection_type,
                id,
                event_id,
                "Conditional projection update rejected: stored snapshot is not older"
            );
            return Err(KeelError::ConcurrencyConflict(format!(
                "projection {}/{} is already at or beyond event {}",
                projection_type, id, event_id
            )));
        }

        observe::record_projection_write("conditional");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(store: &SqliteStore, id: &str) -> StoredProjection {
        store.get_projection("list", id).unwrap().unwrap()
    }

    #[test]
    fn test_save_creates_then_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_projection("list", "L1").unwrap().is_none());

        store
            .save_projection("list", "L1", &json!({ "name": "a" }), 5)
            .unwrap();
        assert_eq!(stored(&store, "L1").last_event_id, 5);

        // Unconditional: an older event id still overwrites
        store
            .save_projection("list", "L1", &json!({ "name": "b" }), 3)
            .unwrap();
        let row = stored(&store, "L1");
        assert_eq!(row.data, json!({ "name": "b" }));
        assert_eq!(row.last_event_id, 3);
    }

    #[test]
    fn test_key_includes_type() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_projection("list", "X", &json!({ "a": 1 }), 1).unwrap();
        store.save_projection("summary", "X", &json!({ "b": 2 }), 2).unwrap();

        assert_eq!(stored(&store, "X").data, json!({ "a": 1 }));
        assert_eq!(
            store.get_projection("summary", "X").unwrap().unwrap().data,
            json!({ "b": 2 })
        );
    }

    #[test]
    fn test_force_update_keeps_event_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_projection("list", "L1", &json!({ "name": "a" }), 9).unwrap();
        store
            .force_update_projection("list", "L1", &json!({ "name": "fixed" }))
            .unwrap();

        let row = stored(&store, "L1");
        assert_eq!(row.data, json!({ "name": "fixed" }));
        assert_eq!(row.last_event_id, 9);
    }

    #[test]
    fn test_force_update_missing_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .force_update_projection("list", "nope", &json!({}))
            .unwrap_err();
        assert!(matches!(err, KeelError::NotFound(_)));
    }

    #[test]
    fn test_conditional_update_moves_forward_only() {
        let store = SqliteStore::open_in_memory().unwrap();

        // First write to a missing row always succeeds
        store
            .conditional_update_projection("list", "L1", &json!({ "v": 1 }), 4)
            .unwrap();

        for stale in [4, 2] {
            let err = store
                .conditional_update_projection("list", "L1", &json!({ "v": 0 }), stale)
                .unwrap_err();
            assert!(err.is_conflict());
            let row = stored(&store, "L1");
            assert_eq!(row.data, json!({ "v": 1 }));
            assert_eq!(row.last_event_id, 4);
        }

        store
            .conditional_update_projection("list", "L1", &json!({ "v": 2 }), 5)
            .unwrap();
        let row = stored(&store, "L1");
        assert_eq!(row.data, json!({ "v": 2 }));
        assert_eq!(row.last_event_id, 5);
    }

    #[test]
    fn test_query_by_type_and_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_projection("list", "L1", &json!({ "owner": "ana", "open": 2 }), 1)
            .unwrap();
        store
            .save_projection("list", "L2", &json!({ "owner": "bo", "open": 0 }), 2)
            .unwrap();
        store
            .save_projection("other", "O1", &json!({ "owner": "ana" }), 3)
            .unwrap();

        let all = store.query_projections("list", None).unwrap();
        assert_eq!(all.len(), 2);

        let ana = store
            .query_projections("list", Some(&Filter::new().eq("owner", "ana")))
            .unwrap();
        assert_eq!(ana.len(), 1);
        assert_eq!(ana[0].id, "L1");

        let busy = store
            .query_projections("list", Some(&Filter::new().gt("open", 0)))
            .unwrap();
        assert_eq!(busy.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["L1"]);
    }

    #[test]
    fn test_projection_data_index_is_usable() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_projection_data_index("owner").unwrap();
        store
            .save_projection("list", "L1", &json!({ "owner": "ana" }), 1)
            .unwrap();

        let found = store
            .query_projections("list", Some(&Filter::new().eq("owner", "ana")))
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
