//! Engine counters, rendered in Prometheus text format

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ErrorKind, ExecutionError};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub statements_total: AtomicU64,
    pub statements_failed_total: AtomicU64,
    pub units_dispatched_total: AtomicU64,
    pub driver_errors_total: AtomicU64,
    pub timeouts_total: AtomicU64,
    pub resource_errors_total: AtomicU64,
    pub unsupported_total: AtomicU64,
    pub ddl_refreshes_total: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_statement(&self, units: usize) {
        self.statements_total.fetch_add(1, Ordering::Relaxed);
        self.units_dispatched_total
            .fetch_add(units as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, err: &ExecutionError) {
        self.statements_failed_total.fetch_add(1, Ordering::Relaxed);
        let counter = match err.kind() {
            ErrorKind::Driver => &self.driver_errors_total,
            ErrorKind::Timeout => &self.timeouts_total,
            ErrorKind::Resource => &self.resource_errors_total,
            ErrorKind::Unsupported => &self.unsupported_total,
            ErrorKind::InvalidState | ErrorKind::Unknown => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.ddl_refreshes_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Prometheus exposition of the counters plus the collector gauges
    pub fn render(&self, in_flight: usize, discarded: u64) -> String {
        let mut output = String::new();

        let counters = [
            (
                "shardline_statements_total",
                "Total number of logical statements executed",
                &self.statements_total,
            ),
            (
                "shardline_statements_failed_total",
                "Total number of logical statements that failed",
                &self.statements_failed_total,
            ),
            (
                "shardline_units_dispatched_total",
                "Total number of physical statements dispatched to backends",
                &self.units_dispatched_total,
            ),
            (
                "shardline_driver_errors_total",
                "Statements failed by a backend error",
                &self.driver_errors_total,
            ),
            (
                "shardline_timeouts_total",
                "Statements that timed out waiting for replies",
                &self.timeouts_total,
            ),
            (
                "shardline_resource_errors_total",
                "Statements failed while acquiring connections",
                &self.resource_errors_total,
            ),
            (
                "shardline_unsupported_total",
                "Statements rejected as unsupported",
                &self.unsupported_total,
            ),
            (
                "shardline_ddl_refreshes_total",
                "Table metadata reloads triggered by DDL",
                &self.ddl_refreshes_total,
            ),
        ];

        for (name, help, counter) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n\n", name, counter.load(Ordering::Relaxed)));
        }

        output.push_str("# HELP shardline_pending_waits Forwarded statements awaiting replies\n");
        output.push_str("# TYPE shardline_pending_waits gauge\n");
        output.push_str(&format!("shardline_pending_waits {}\n\n", in_flight));

        output.push_str("# HELP shardline_discarded_replies_total Replies dropped after timeout or for unknown ids\n");
        output.push_str("# TYPE shardline_discarded_replies_total counter\n");
        output.push_str(&format!("shardline_discarded_replies_total {}\n", discarded));

        output
    }
}
