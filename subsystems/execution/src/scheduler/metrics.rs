//! # Scheduler Metrics
//!
//! Counters a scheduler implementation can keep for [`SchedulerStats`].
//!
//! [`SchedulerStats`]: super::SchedulerStats

use core::sync::atomic::{AtomicU64, Ordering};

/// Scheduler metrics
#[derive(Debug)]
pub struct SchedulerMetrics {
    /// Total context switches
    context_switches: AtomicU64,
    /// Total voluntary yields
    voluntary_yields: AtomicU64,
    /// Total blocking waits
    blocks: AtomicU64,
}

impl SchedulerMetrics {
    /// Create new metrics
    pub const fn new() -> Self {
        Self {
            context_switches: AtomicU64::new(0),
            voluntary_yields: AtomicU64::new(0),
            blocks: AtomicU64::new(0),
        }
    }

    /// Record a context switch
    pub fn record_context_switch(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a voluntary yield
    pub fn record_yield(&self) {
        self.voluntary_yields.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a blocking wait
    pub fn record_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total context switches
    pub fn context_switches(&self) -> u64 {
        self.context_switches.load(Ordering::Relaxed)
    }

    /// Get voluntary yields
    pub fn voluntary_yields(&self) -> u64 {
        self.voluntary_yields.load(Ordering::Relaxed)
    }

    /// Get blocking waits
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = SchedulerMetrics::new();
        metrics.record_context_switch();
        metrics.record_context_switch();
        metrics.record_yield();
        metrics.record_block();
        assert_eq!(metrics.context_switches(), 2);
        assert_eq!(metrics.voluntary_yields(), 1);
        assert_eq!(metrics.blocks(), 1);
    }
}
