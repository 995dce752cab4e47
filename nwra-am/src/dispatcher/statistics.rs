//! Run statistics shared between dispatcher workers

use crate::models::FileState;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free counters updated by concurrent workers
#[derive(Debug, Default)]
pub struct RunStatistics {
    started: AtomicUsize,
    finished: AtomicUsize,
    skipped: AtomicUsize,
    completed: AtomicUsize,
    partially_failed: AtomicUsize,
    combinations_succeeded: AtomicUsize,
    combinations_failed: AtomicUsize,
    mosaics_built: AtomicUsize,
}

/// Point-in-time copy of [`RunStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub started: usize,
    pub finished: usize,
    pub skipped: usize,
    pub completed: usize,
    pub partially_failed: usize,
    pub combinations_succeeded: usize,
    pub combinations_failed: usize,
    pub mosaics_built: usize,
}

impl StatisticsSnapshot {
    /// "Processing X to Y of Z": finished, started, total
    pub fn progress_string(&self, total: usize) -> String {
        format!("Processing {} to {} of {}", self.finished, self.started, total)
    }

    pub fn display_string(&self) -> String {
        format!(
            "{} completed, {} partially failed, {} skipped; {} outputs, {} failed combinations, {} mosaics",
            self.completed,
            self.partially_failed,
            self.skipped,
            self.combinations_succeeded,
            self.combinations_failed,
            self.mosaics_built
        )
    }
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a file reaching a terminal state; returns the number finished so far
    pub fn file_finished(&self, state: FileState) -> usize {
        let counter = match state {
            FileState::Skipped => &self.skipped,
            FileState::Completed => &self.completed,
            FileState::PartiallyFailed => &self.partially_failed,
            FileState::Discovered | FileState::Processing => {
                return self.finished.load(Ordering::Relaxed);
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.finished.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn combination(&self, success: bool) {
        if success {
            self.combinations_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.combinations_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn mosaic_built(&self) {
        self.mosaics_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            partially_failed: self.partially_failed.load(Ordering::Relaxed),
            combinations_succeeded: self.combinations_succeeded.load(Ordering::Relaxed),
            combinations_failed: self.combinations_failed.load(Ordering::Relaxed),
            mosaics_built: self.mosaics_built.load(Ordering::Relaxed),
        }
    }
}
