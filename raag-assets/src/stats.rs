//! Run statistics and progress reporting
//!
//! Counters are owned by the orchestrator for one run and never persisted.

use raag_common::human_time::{estimate_remaining, format_duration, format_eta};
use serde::Serialize;
use std::time::Duration;

/// Per-run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    /// Assets that entered acquisition
    pub attempted: usize,
    /// Assets acquired as genuine content
    pub succeeded: usize,
    /// Assets whose acquisition failed (with or without a placeholder)
    pub failed: usize,
    /// Assets already checkpointed or genuinely present
    pub skipped: usize,
    /// Failed assets now backed by a placeholder
    pub placeholders: usize,
    /// Failed assets left with nothing usable on disk
    pub hard_failures: usize,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assets that reached any outcome this run
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Every asset counted is either acquired or skipped
    pub fn all_favorable(&self, catalog_size: usize) -> bool {
        self.succeeded + self.skipped == catalog_size
    }

    pub fn display_string(&self) -> String {
        format!(
            "{} succeeded, {} failed ({} placeholders, {} hard failures), {} skipped, {} attempted",
            self.succeeded,
            self.failed,
            self.placeholders,
            self.hard_failures,
            self.skipped,
            self.attempted
        )
    }
}

/// Progress line after an asset resolves
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub stats: RunStatistics,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }

    /// Remaining time from the mean per-asset duration so far
    pub fn eta(&self) -> Option<Duration> {
        estimate_remaining(self.elapsed, self.completed, self.total)
    }

    pub fn display_string(&self) -> String {
        format!(
            "[{}/{}] {:.1}% | {} ok, {} failed, {} skipped | elapsed {} | ETA {}",
            self.completed,
            self.total,
            self.percent(),
            self.stats.succeeded,
            self.stats.failed,
            self.stats.skipped,
            format_duration(self.elapsed),
            format_eta(self.eta())
        )
    }
}
