//! Global atomic counters for gateway observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the CLI exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    evaluations_started: AtomicU64,
    evaluations_completed: AtomicU64,
    backend_timeouts: AtomicU64,
    backend_retries: AtomicU64,
    backend_unavailable: AtomicU64,
    tool_failures: AtomicU64,
    archive_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations_started: AtomicU64::new(0),
            evaluations_completed: AtomicU64::new(0),
            backend_timeouts: AtomicU64::new(0),
            backend_retries: AtomicU64::new(0),
            backend_unavailable: AtomicU64::new(0),
            tool_failures: AtomicU64::new(0),
            archive_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_started(&self) {
        self.evaluations_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_started", "counter incremented");
    }

    pub fn inc_completed(&self) {
        self.evaluations_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_completed", "counter incremented");
    }

    pub fn inc_timeouts(&self) {
        self.backend_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "backend_timeouts", "counter incremented");
    }

    pub fn inc_retries(&self) {
        self.backend_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "backend_retries", "counter incremented");
    }

    pub fn inc_unavailable(&self) {
        self.backend_unavailable.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "backend_unavailable", "counter incremented");
    }

    pub fn inc_tool_failures(&self) {
        self.tool_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_failures", "counter incremented");
    }

    pub fn inc_archive_failures(&self) {
        self.archive_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "archive_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations_started = self.evaluations_started(),
            evaluations_completed = self.evaluations_completed(),
            backend_timeouts = self.backend_timeouts(),
            backend_retries = self.backend_retries(),
            backend_unavailable = self.backend_unavailable(),
            tool_failures = self.tool_failures(),
            archive_failures = self.archive_failures(),
        );
    }

    pub fn evaluations_started(&self) -> u64 {
        self.evaluations_started.load(Ordering::Relaxed)
    }

    pub fn evaluations_completed(&self) -> u64 {
        self.evaluations_completed.load(Ordering::Relaxed)
    }

    pub fn backend_timeouts(&self) -> u64 {
        self.backend_timeouts.load(Ordering::Relaxed)
    }

    pub fn backend_retries(&self) -> u64 {
        self.backend_retries.load(Ordering::Relaxed)
    }

    pub fn backend_unavailable(&self) -> u64 {
        self.backend_unavailable.load(Ordering::Relaxed)
    }

    pub fn tool_failures(&self) -> u64 {
        self.tool_failures.load(Ordering::Relaxed)
    }

    pub fn archive_failures(&self) -> u64 {
        self.archive_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.evaluations_started,
            &self.evaluations_completed,
            &self.backend_timeouts,
            &self.backend_retries,
            &self.backend_unavailable,
            &self.tool_failures,
            &self.archive_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_started();
        m.inc_started();
        assert_eq!(m.evaluations_started(), 2);

        m.inc_timeouts();
        m.inc_retries();
        m.inc_retries();
        assert_eq!(m.backend_timeouts(), 1);
        assert_eq!(m.backend_retries(), 2);
        assert_eq!(m.archive_failures(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_started();
        m.inc_completed();
        m.inc_unavailable();
        m.inc_tool_failures();
        m.inc_archive_failures();
        m.reset();
        assert_eq!(m.evaluations_started(), 0);
        assert_eq!(m.evaluations_completed(), 0);
        assert_eq!(m.backend_unavailable(), 0);
        assert_eq!(m.tool_failures(), 0);
        assert_eq!(m.archive_failures(), 0);
    }
}
