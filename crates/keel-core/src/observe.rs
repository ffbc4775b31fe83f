//! Optional metrics instrumentation for keel.
//!
//! When the `observe` feature is enabled, store operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must install
//! a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record appended events.
///
/// - `keel.events.appended_total` – counter with `mode` label (`plain` / `conditional`)
/// - `keel.events.append_duration_seconds` – histogram
#[inline]
pub fn record_append(duration: std::time::Duration, events: usize, conditional: bool) {
    #[cfg(feature = "observe")]
    {
        let mode = if conditional { "conditional" } else { "plain" };
        metrics::counter!("keel.events.appended_total", "mode" => mode).increment(events as u64);
        metrics::histogram!("keel.events.append_duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, events, conditional);
    }
}

/// Record a rejected conditional write.
///
/// - `keel.conflicts_total` – counter with `target` label (`events` / `projections`)
#[inline]
pub fn record_conflict(target: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("keel.conflicts_total", "target" => target).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = target;
    }
}

/// Record an event or projection read.
///
/// - `keel.query.rows_total` – counter
/// - `keel.query.duration_seconds` – histogram
#[inline]
pub fn record_query(duration: std::time::Duration, rows: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("keel.query.rows_total").increment(rows as u64);
        metrics::histogram!("keel.query.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, rows);
    }
}

/// Record a projection write.
///
/// - `keel.projections.writes_total` – counter with `mode` label
#[inline]
pub fn record_projection_write(mode: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("keel.projections.writes_total", "mode" => mode).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = mode;
    }
}
