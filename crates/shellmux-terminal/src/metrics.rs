//! Dispatch metrics
//!
//! Pure aggregation over all dispatches, successful or timed out. Counters
//! only move forward within a process lifetime; the active-session count is
//! supplied live by the caller at snapshot time, never cached here.

use std::sync::atomic::{AtomicU64, Ordering};

use shellmux_types::MetricsSnapshot;

#[derive(Default)]
pub struct MetricsCollector {
    commands_executed: AtomicU64,
    total_execution_time_ms: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, execution_time_ms: u64) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        self.total_execution_time_ms
            .fetch_add(execution_time_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_sessions: usize) -> MetricsSnapshot {
        let commands_executed = self.commands_executed.load(Ordering::Relaxed);
        let total_execution_time_ms = self.total_execution_time_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            commands_executed,
            total_execution_time_ms,
            average_execution_time_ms: if commands_executed == 0 {
                0
            } else {
                total_execution_time_ms / commands_executed
            },
            active_sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_zero_average() {
        let metrics = MetricsCollector::new();
        let snap = metrics.snapshot(0);
        assert_eq!(snap.commands_executed, 0);
        assert_eq!(snap.average_execution_time_ms, 0);
    }

    #[test]
    fn record_aggregates_counts_and_times() {
        let metrics = MetricsCollector::new();
        metrics.record(100);
        metrics.record(300);

        let snap = metrics.snapshot(2);
        assert_eq!(snap.commands_executed, 2);
        assert_eq!(snap.total_execution_time_ms, 400);
        assert_eq!(snap.average_execution_time_ms, 200);
        assert_eq!(snap.active_sessions, 2);
    }
}
