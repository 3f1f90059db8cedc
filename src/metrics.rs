// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the version store.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `version_store_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: add_event, delete_event, digests, hydrate
//! - `status`: success, invalid, backend_error
//! - `tree`: entity_id, user_defined
//! - `kind`: flat, incremental

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a store operation outcome
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "version_store_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "version_store_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record how many tree nodes a digest refresh actually rehashed
pub fn record_digest_recompute(tree: &str, nodes: usize) {
    counter!(
        "version_store_digest_nodes_recomputed_total",
        "tree" => tree.to_string()
    )
    .increment(nodes as u64);
}

/// Record a comparison run and how many differences it found
pub fn record_comparison(kind: &str, differences: usize) {
    counter!(
        "version_store_comparisons_total",
        "kind" => kind.to_string()
    )
    .increment(1);
    histogram!(
        "version_store_comparison_differences",
        "kind" => kind.to_string()
    )
    .record(differences as f64);
}

/// Set the current event count for an endpoint
pub fn set_endpoint_events(endpoint: u64, count: usize) {
    gauge!(
        "version_store_endpoint_events",
        "endpoint" => endpoint.to_string()
    )
    .set(count as f64);
}

/// Record a backend error after retries were exhausted
pub fn record_backend_error(operation: &str) {
    counter!(
        "version_store_backend_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($op:expr) => {
        $crate::metrics::LatencyTimer::new($op)
    };
}
