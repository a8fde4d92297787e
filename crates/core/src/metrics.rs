//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Command assembly (combinations)
//! - Execution (processes started and finished, run time)
//! - Cleanup (outputs removed after a tool error)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Assembly Metrics
// =============================================================================

/// Command lines frozen by a combination.
pub static COMMANDS_COMBINED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidkit_commands_combined_total",
        "Total command lines assembled",
    )
    .unwrap()
});

// =============================================================================
// Execution Metrics
// =============================================================================

/// Processes started by execution mode.
pub static PROCESSES_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidkit_processes_started_total", "Total processes started"),
        &["mode"], // "blocking", "non_blocking"
    )
    .unwrap()
});

/// Processes observed to finish, by result.
pub static PROCESSES_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidkit_processes_finished_total", "Total processes finished"),
        &["result"], // "success", "error"
    )
    .unwrap()
});

/// Process run time in seconds.
pub static PROCESS_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidkit_process_duration_seconds",
            "Run time of finished processes",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Cleanup Metrics
// =============================================================================

/// Output files removed after the tool reported an error.
pub static OUTPUTS_REMOVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidkit_outputs_removed_total",
        "Total output files removed after a failed run",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Assembly
        Box::new(COMMANDS_COMBINED.clone()),
        // Execution
        Box::new(PROCESSES_STARTED.clone()),
        Box::new(PROCESSES_FINISHED.clone()),
        Box::new(PROCESS_DURATION.clone()),
        // Cleanup
        Box::new(OUTPUTS_REMOVED.clone()),
    ]
}
