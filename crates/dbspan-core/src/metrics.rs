//! Instrumentation health counters
//!
//! Counters for monitoring the tracer itself. All relaxed atomics; these
//! are monitoring data, not synchronization.

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing what the tracer has done so far
#[derive(Debug, Default)]
pub struct TracerMetrics {
    /// Spans opened on command start
    pub spans_started: AtomicU64,

    /// Spans closed on successful completion
    pub spans_completed: AtomicU64,

    /// Spans closed as faulted
    pub spans_faulted: AtomicU64,

    /// Commands skipped by the policy filter at start
    pub commands_filtered: AtomicU64,

    /// Cache entries removed by expiry sweeps
    pub entries_pruned: AtomicU64,

    /// Commands that started with no active trace context
    pub context_misses: AtomicU64,

    /// Recorder operations that failed for any other reason
    pub recorder_errors: AtomicU64,
}

impl TracerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "spans_started": self.spans_started.load(Ordering::Relaxed),
            "spans_completed": self.spans_completed.load(Ordering::Relaxed),
            "spans_faulted": self.spans_faulted.load(Ordering::Relaxed),
            "commands_filtered": self.commands_filtered.load(Ordering::Relaxed),
            "entries_pruned": self.entries_pruned.load(Ordering::Relaxed),
            "context_misses": self.context_misses.load(Ordering::Relaxed),
            "recorder_errors": self.recorder_errors.load(Ordering::Relaxed),
        })
    }
}
