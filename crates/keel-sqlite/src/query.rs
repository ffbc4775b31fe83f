//! Predicate and statement builder
//!
//! Compiles [`Filter`]s and [`StreamSpec`]s into parameterized SQL fragments
//! over the JSON `data` column. Fragments use anonymous `?` placeholders, so
//! parameters must be bound in the order they are collected.

use keel_core::error::Result;
use keel_core::filter::{validate_field_name, Condition, Filter, Scalar, ScalarKind};
use keel_core::types::{EventId, StreamSpec};
use rusqlite::types::Value as SqlValue;

/// Column list shared by every event read.
pub(crate) const EVENT_COLUMNS: &str = "id, type, data, created_at, updated_at";

/// Column list shared by every projection read.
pub(crate) const PROJECTION_COLUMNS: &str =
    "type, id, data, latest_event_id, created_at, updated_at";

/// Current time in the format stored in timestamp columns.
pub(crate) const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// A SQL boolean expression together with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Predicate {
    fn always() -> Self {
        Self {
            sql: "1".into(),
            params: Vec::new(),
        }
    }

    fn never() -> Self {
        Self {
            sql: "0".into(),
            params: Vec::new(),
        }
    }

    fn join(parts: Vec<Predicate>, op: &str) -> Self {
        let mut sql = String::new();
        let mut params = Vec::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                sql.push_str(op);
            }
            sql.push('(');
            sql.push_str(&part.sql);
            sql.push(')');
            params.extend(part.params);
        }
        Self { sql, params }
    }
}

/// `json_extract` expression for a top-level payload key.
///
/// The key is embedded as a literal (not a parameter) so the expression can
/// match a data index created by [`data_index_sql`].
pub(crate) fn json_field(field: &str) -> String {
    format!("json_extract(data, '$.\"{}\"')", field.replace('\'', "''"))
}

fn cast_type(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Text => "TEXT",
        ScalarKind::Number => "REAL",
        ScalarKind::Bool => "INTEGER",
    }
}

/// Payload field cast to the type of the operand it is compared with.
///
/// `json_extract` yields `1`/`0` for JSON booleans, so the text form spells
/// them out as `'true'`/`'false'` to match their JSON text.
pub(crate) fn field_expr(field: &str, kind: ScalarKind) -> String {
    let cast = format!("CAST({} AS {})", json_field(field), cast_type(kind));
    match kind {
        ScalarKind::Text => format!(
            "CASE json_type(data, '$.\"{path}\"') WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' ELSE {cast} END",
            path = field.replace('\'', "''"),
            cast = cast
        ),
        ScalarKind::Number | ScalarKind::Bool => cast,
    }
}

fn bind(scalar: &Scalar) -> SqlValue {
    match scalar {
        Scalar::Text(s) => SqlValue::Text(s.clone()),
        Scalar::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Scalar::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Scalar::NonFinite(f) => SqlValue::Real(*f),
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn compile_condition(field: &str, condition: &Condition) -> Predicate {
    let kind = condition.kind().unwrap_or(ScalarKind::Text);
    let expr = field_expr(field, kind);
    match condition {
        Condition::Compare(cmp, scalar) => Predicate {
            sql: format!("{} {} ?", expr, cmp.sql_op()),
            params: vec![bind(scalar)],
        },
        Condition::In(values) => Predicate {
            sql: format!("{} IN ({})", expr, placeholders(values.len())),
            params: values.iter().map(bind).collect(),
        },
        Condition::NotIn(values) => Predicate {
            sql: format!("{} NOT IN ({})", expr, placeholders(values.len())),
            params: values.iter().map(bind).collect(),
        },
    }
}

/// Compile a filter into an AND of per-operator comparisons.
///
/// An empty filter compiles to a predicate that is always true.
pub fn compile_filter(filter: &Filter) -> Result<Predicate> {
    filter.validate()?;

    let parts: Vec<Predicate> = filter
        .fields()
        .iter()
        .flat_map(|f| {
            f.conditions
                .iter()
                .map(move |c| compile_condition(&f.field, c))
        })
        .collect();

    if parts.is_empty() {
        return Ok(Predicate::always());
    }
    Ok(Predicate::join(parts, " AND "))
}

fn compile_optional(filter: Option<&Filter>) -> Result<Predicate> {
    match filter {
        Some(filter) => compile_filter(filter),
        None => Ok(Predicate::always()),
    }
}

/// `type IN (..) AND <filter>` for one stream.
pub fn compile_stream(spec: &StreamSpec) -> Result<Predicate> {
    if spec.types.is_empty() {
        return Ok(Predicate::never());
    }
    let types = Predicate {
        sql: format!("type IN ({})", placeholders(spec.types.len())),
        params: spec.types.iter().cloned().map(SqlValue::Text).collect(),
    };
    let filter = compile_optional(spec.filter())?;
    Ok(Predicate::join(vec![types, filter], " AND "))
}

/// OR of the stream predicates. An empty list matches nothing.
pub fn compile_streams(specs: &[StreamSpec]) -> Result<Predicate> {
    if specs.is_empty() {
        return Ok(Predicate::never());
    }
    let parts = specs.iter().map(compile_stream).collect::<Result<Vec<_>>>()?;
    Ok(Predicate::join(parts, " OR "))
}

/// Ascending read over the union of `specs`.
///
/// A single scan with OR-ed stream predicates returns every matching row
/// once, which is what de-duplicates events matching several streams.
pub fn select_streams(specs: &[StreamSpec], after: Option<EventId>) -> Result<Predicate> {
    let streams = compile_streams(specs)?;
    let mut sql = format!(
        "SELECT {} FROM events WHERE ({})",
        EVENT_COLUMNS, streams.sql
    );
    let mut params = streams.params;
    if let Some(after) = after {
        sql.push_str(" AND id > ?");
        params.push(SqlValue::Integer(after));
    }
    sql.push_str(" ORDER BY id ASC");
    Ok(Predicate { sql, params })
}

pub fn select_latest(event_type: &str, filter: Option<&Filter>) -> Result<Predicate> {
    let filter = compile_optional(filter)?;
    let mut params = vec![SqlValue::Text(event_type.to_string())];
    params.extend(filter.params);
    Ok(Predicate {
        sql: format!(
            "SELECT {} FROM events WHERE type = ? AND ({}) ORDER BY id DESC LIMIT 1",
            EVENT_COLUMNS, filter.sql
        ),
        params,
    })
}

pub fn select_projections(projection_type: &str, filter: Option<&Filter>) -> Result<Predicate> {
    let filter = compile_optional(filter)?;
    let mut params = vec![SqlValue::Text(projection_type.to_string())];
    params.extend(filter.params);
    Ok(Predicate {
        sql: format!(
            "SELECT {} FROM projections WHERE type = ? AND ({}) ORDER BY id ASC",
            PROJECTION_COLUMNS, filter.sql
        ),
        params,
    })
}

/// Guarded multi-row insert.
///
/// The candidate rows come from a `VALUES` list and are only selected when
/// no event newer than `latest_event_id` matches any of `specs`. The check
/// and the insert are one statement. Parameters: `(type, data)` pairs, then
/// `latest_event_id`, then the stream parameters.
pub fn conditional_insert(rows: usize, streams: &Predicate) -> String {
    let values = vec!["(?, ?)"; rows].join(", ");
    format!(
        "INSERT INTO events (type, data) \
         SELECT column1, column2 FROM (VALUES {}) \
         WHERE NOT EXISTS (SELECT 1 FROM events WHERE id > ? AND ({})) \
         RETURNING {}",
        values, streams.sql, EVENT_COLUMNS
    )
}

/// Expression index matching the string comparison emitted for `field`.
pub fn data_index_sql(table: &str, field: &str) -> Result<String> {
    validate_field_name(field)?;
    let suffix: String = field.bytes().map(|b| format!("{:02x}", b)).collect();
    Ok(format!(
        "CREATE INDEX IF NOT EXISTS {table}_data_idx_{suffix} ON {table} ({expr})",
        table = table,
        suffix = suffix,
        expr = field_expr(field, ScalarKind::Text)
    ))
}
