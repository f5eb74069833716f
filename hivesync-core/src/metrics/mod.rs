//! Metrics recorded by HiveSync
//!
//! Counters and histograms go through the `metrics` facade. The library never
//! installs a recorder; without one every call here is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Overlay calls made by the data manager, labelled `op` and `outcome`
pub const DHT_OPERATIONS: &str = "hivesync_dht_operations_total";

/// Overlay call latency in milliseconds, labelled `op`
pub const DHT_OPERATION_DURATION: &str = "hivesync_dht_operation_duration_ms";

/// Finished processes, labelled `status`
pub const PROCESS_COMPLETED: &str = "hivesync_process_completed_total";

/// Compensating actions that failed during rollback
pub const ROLLBACK_FAILURES: &str = "hivesync_rollback_failures_total";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(DHT_OPERATIONS, "Overlay operations issued by the data manager");
    describe_histogram!(DHT_OPERATION_DURATION, "Overlay operation duration in milliseconds");
    describe_counter!(PROCESS_COMPLETED, "Processes that reached a terminal status");
    describe_counter!(ROLLBACK_FAILURES, "Rollback actions that failed");
}

pub fn record_dht_operation(op: &'static str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!(DHT_OPERATIONS, "op" => op, "outcome" => outcome).increment(1);
}

pub fn record_process_completed(status: &'static str) {
    counter!(PROCESS_COMPLETED, "status" => status).increment(1);
}

pub fn record_rollback_failures(count: u64) {
    if count > 0 {
        counter!(ROLLBACK_FAILURES).increment(count);
    }
}

/// Timer for measuring overlay call duration
pub struct Timer {
    op: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(op: &'static str) -> Self {
        Self { op, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(DHT_OPERATION_DURATION, "op" => self.op).record(duration.as_secs_f64() * 1000.0);
    }
}
