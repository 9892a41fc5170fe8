//! Command correlation cache with time-bounded pruning
//!
//! One entry per in-flight command, keyed by the driver's request id. The
//! completion callback takes the entry back out; entries whose completion
//! never arrives are swept once they outlive the configured window.
//!
//! The sweep is amortized: every command start calls
//! [`CorrelationCache::prune`], which is O(1) until the shared deadline
//! passes, and a single compare-and-swap picks the one caller that pays
//! for the O(n) pass. No background thread, no idle wake-ups.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dbspan_core::TraceContext;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

/// Trace context captured at command start, plus when it was cached
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Insertion time, compared against the expiry threshold by the sweep
    pub inserted_at: DateTime<Utc>,

    /// Context to reattach before closing the span
    pub context: TraceContext,
}

/// Concurrent map of in-flight commands to their captured trace context
pub struct CorrelationCache {
    entries: DashMap<i64, CacheEntry>,

    /// Epoch milliseconds of the next due sweep
    next_prune_at: AtomicI64,

    max_entry_age: Duration,
}

impl CorrelationCache {
    /// Create a cache; the first sweep comes due one `max_entry_age` from now
    pub fn new(max_entry_age: Duration) -> Self {
        Self::new_at(max_entry_age, Utc::now())
    }

    /// Create a cache with an explicit construction time
    pub fn new_at(max_entry_age: Duration, now: DateTime<Utc>) -> Self {
        Self {
            entries: DashMap::new(),
            next_prune_at: AtomicI64::new((now + max_entry_age).timestamp_millis()),
            max_entry_age,
        }
    }

    /// Cache the context captured for a started command.
    ///
    /// Request ids are unique per in-flight command; a duplicate id is a
    /// caller contract violation and simply overwrites.
    pub fn insert(&self, request_id: i64, context: TraceContext) {
        self.insert_at(request_id, context, Utc::now());
    }

    /// Cache a context with an explicit insertion time
    pub fn insert_at(&self, request_id: i64, context: TraceContext, now: DateTime<Utc>) {
        self.entries.insert(
            request_id,
            CacheEntry {
                inserted_at: now,
                context,
            },
        );
    }

    /// Remove and return the entry for a completed command.
    ///
    /// Absence is a normal outcome: the command was filtered at start,
    /// already taken, or already pruned.
    pub fn take(&self, request_id: i64) -> Option<CacheEntry> {
        self.entries.remove(&request_id).map(|(_, entry)| entry)
    }

    /// Sweep expired entries if a sweep is due.
    ///
    /// Returns `None` when no sweep was due or another caller won the
    /// race, `Some(removed)` when this caller performed the sweep.
    pub fn prune(&self, now: DateTime<Utc>) -> Option<usize> {
        let due_at = self.next_prune_at.load(Ordering::Acquire);
        if now.timestamp_millis() < due_at {
            return None;
        }

        let next = (now + self.max_entry_age).timestamp_millis();
        if self
            .next_prune_at
            .compare_exchange(due_at, next, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another thread owns this sweep
            return None;
        }

        let threshold = now - self.max_entry_age;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.inserted_at >= threshold);
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!(removed, "pruned expired command cache entries");
        }
        Some(removed)
    }

    /// Number of in-flight entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured eviction window
    pub fn max_entry_age(&self) -> Duration {
        self.max_entry_age
    }
}
