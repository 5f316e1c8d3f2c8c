//! Negative caches for acquisition failures.
//!
//! Two independent caches, both keyed by the exact URL that failed:
//! a permanent 404 set (a URL that returned 404 once is never fetched
//! again for the lifetime of the process) and a timeout map that counts
//! failures so repeat offenders are skipped after the retry policy is
//! exhausted.

use dashmap::{DashMap, DashSet};

/// Per-URL timeout bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutRecord {
    /// Consecutive acquisition timeouts for this URL.
    pub fail_count: u32,
}

/// Shared failure memory across concurrent parses.
///
/// Both maps are lock-free and safe to consult from any task.
#[derive(Debug, Default)]
pub struct NegativeCaches {
    not_found: DashSet<String>,
    timeouts: DashMap<String, TimeoutRecord>,
}

impl NegativeCaches {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `url` previously returned HTTP 404.
    #[must_use]
    pub fn has_404(&self, url: &str) -> bool {
        self.not_found.contains(url)
    }

    pub fn record_404(&self, url: &str) {
        self.not_found.insert(url.to_string());
    }

    /// Timeout record for `url`, if any failure has been seen.
    #[must_use]
    pub fn timeout_record(&self, url: &str) -> Option<TimeoutRecord> {
        self.timeouts.get(url).map(|r| *r)
    }

    /// Increment the timeout failure count for `url`.
    pub fn record_timeout(&self, url: &str) {
        self.timeouts.entry(url.to_string()).or_default().fail_count += 1;
    }
}
