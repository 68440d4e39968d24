// src/core/metrics.rs

//! Defines and registers Prometheus metrics for shared-session monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    // --- Gauges ---
    /// The number of shared sessions currently open.
    pub static ref OPEN_SESSIONS: Gauge =
        register_gauge!("clusterlink_open_sessions", "Number of shared sessions currently open.").unwrap();
    /// The number of references currently held across all shared sessions.
    pub static ref SESSION_REFERENCES: Gauge =
        register_gauge!("clusterlink_session_references", "Number of live references to shared sessions.").unwrap();

    // --- Counters ---
    pub static ref SESSIONS_CREATED_TOTAL: Counter =
        register_counter!("clusterlink_sessions_created_total", "Total number of shared sessions created.").unwrap();
    pub static ref SESSIONS_DISPOSED_TOTAL: Counter =
        register_counter!("clusterlink_sessions_disposed_total", "Total number of shared sessions disposed.").unwrap();
    /// Acquire attempts that lost the race against the final release.
    pub static ref STALE_ACQUIRES_TOTAL: Counter =
        register_counter!("clusterlink_stale_acquires_total", "Total number of acquire attempts on drained sessions.").unwrap();
    pub static ref SESSION_CONSTRUCTION_FAILURES_TOTAL: Counter =
        register_counter!("clusterlink_session_construction_failures_total", "Total number of failed session constructions.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# Failed to encode metrics: {e}"))
}
