//! Metrics instrumentation for cirrid.
//!
//! All metrics are prefixed with `cirrid.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Answered => "answered",
        QueryResult::NoMatch => "no_match",
        QueryResult::Ignored => "ignored",
        QueryResult::Malformed => "malformed",
    };

    counter!("cirrid.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("cirrid.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// A record returned.
    Answered,
    /// A query for a name not in the table.
    NoMatch,
    /// Non-A query; always answered empty.
    Ignored,
    /// Request carried no usable question.
    Malformed,
}

/// Record a reconciliation pass.
pub fn record_reconcile(result: ReconcileResult, entry_failures: usize) {
    let result_str = match result {
        ReconcileResult::Populated => "populated",
        ReconcileResult::Empty => "empty",
        ReconcileResult::Failed => "failed",
    };

    counter!("cirrid.reconcile.count", "result" => result_str).increment(1);
    counter!("cirrid.reconcile.entry_failures.count").increment(entry_failures as u64);
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub enum ReconcileResult {
    /// At least one entry was produced.
    Populated,
    /// Nothing failed but the table is empty.
    Empty,
    /// Sources failed and the table is empty.
    Failed,
}

/// Record a failed OS resolver reconciliation step.
pub fn record_os_reconcile_failure(step: &'static str) {
    counter!("cirrid.os_reconcile.failure.count", "step" => step).increment(1);
}

/// Record table size (call periodically or on publish).
pub fn record_table_counts(entries: usize, wildcards: usize) {
    gauge!("cirrid.table.entries.count").set(entries as f64);
    gauge!("cirrid.table.wildcards.count").set(wildcards as f64);
}

/// Record the table generation.
pub fn record_generation(generation: u32) {
    gauge!("cirrid.table.generation").set(generation as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
