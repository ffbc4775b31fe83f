use crate::query::data_index_sql;
use keel_core::error::{KeelError, Result};
use rusqlite::{Connection, OptionalExtension};

/// Schema version written by this crate
pub const SCHEMA_VERSION: u32 = 1;

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS keel_meta (
        id INTEGER PRIMARY KEY CHECK (id = 0),
        schema_version INTEGER NOT NULL,
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        data TEXT NOT NULL CHECK (json_valid(data)),
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
    CREATE INDEX IF NOT EXISTS events_type_idx ON events (type);
    CREATE INDEX IF NOT EXISTS events_created_at_idx ON events (created_at);

    CREATE TABLE IF NOT EXISTS projections (
        id TEXT NOT NULL,
        type TEXT NOT NULL,
        data TEXT NOT NULL CHECK (json_valid(data)),
        latest_event_id INTEGER NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        PRIMARY KEY (type, id)
    );
    CREATE INDEX IF NOT EXISTS projections_type_idx ON projections (type);
    CREATE INDEX IF NOT EXISTS projections_latest_event_id_idx ON projections (latest_event_id);
";

/// Create tables and indexes if missing and check the stored schema version
///
/// Idempotent: safe to run on every open. A database written by a newer
/// schema version is refused rather than silently misread.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLES)
        .map_err(KeelError::storage)?;

    conn.execute(
        "INSERT OR IGNORE INTO keel_meta (id, schema_version) VALUES (0, ?1)",
        [SCHEMA_VERSION],
    )
    .map_err(KeelError::storage)?;

    let version = schema_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(KeelError::Config(format!(
            "Database schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        )));
    }

    Ok(())
}

/// Read the schema version from metadata
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row(
            "SELECT schema_version FROM keel_meta WHERE id = 0",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(KeelError::storage)?;

    version.ok_or_else(|| KeelError::NotFound("keel_meta row".into()))
}

/// Index a top-level payload key of `events` or `projections`
///
/// The index covers the text comparison the filter compiler emits, so
/// `eq`/`in` string filters on the key can use it.
pub fn create_data_index(conn: &Connection, table: &str, field: &str) -> Result<()> {
    if table != "events" && table != "projections" {
        return Err(KeelError::Config(format!("Unknown table '{}'", table)));
    }
    let sql = data_index_sql(table, field)?;
    conn.execute(&sql, []).map_err(KeelError::storage)?;
    tracing::info!(table, field, "Created payload data index");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_names(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1")
            .unwrap();
        stmt.query_map([table], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let names = index_names(&conn, "events");
        assert!(names.contains(&"events_type_idx".to_string()));
        assert!(names.contains(&"events_created_at_idx".to_string()));
    }

    #[test]
    fn test_newer_schema_refused() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute("UPDATE keel_meta SET schema_version = 99 WHERE id = 0", [])
            .unwrap();

        let err = init_schema(&conn).unwrap_err();
        assert!(matches!(err, KeelError::Config(_)));
    }

    #[test]
    fn test_data_index_created_once() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        create_data_index(&conn, "projections", "listId").unwrap();
        create_data_index(&conn, "projections", "listId").unwrap();

        let data_indexes: Vec<_> = index_names(&conn, "projections")
            .into_iter()
            .filter(|n| n.starts_with("projections_data_idx_"))
            .collect();
        assert_eq!(data_indexes.len(), 1);
    }

    #[test]
    fn test_data_index_unknown_table() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert!(create_data_index(&conn, "keel_meta", "x").is_err());
    }
}
