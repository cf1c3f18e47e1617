use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::time::{Duration, Instant};

/// Why a file was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Lock artifact held by a running engine
    LockConflict,
    /// Stale lock found and the operator declined removing it
    StaleLockKept,
    /// Operator answered No
    Declined,
    /// Operator answered Quit on this file
    Quit,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::LockConflict => "in use by a running instance",
            SkipReason::StaleLockKept => "stale lock kept",
            SkipReason::Declined => "changes declined",
            SkipReason::Quit => "run stopped",
        };
        f.write_str(text)
    }
}

/// Result of processing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Changes were written
    Optimized { changes: usize },
    /// File already complies (or has no adapters)
    Unchanged,
    /// Dry run: changes were computed but not written
    Planned { changes: usize },
    Skipped(SkipReason),
    Failed(String),
}

/// Aggregate counters for one run.
///
/// Owned by the run loop; every scanned file lands in exactly one outcome
/// bucket. Files never visited (after Quit) are not counted at all.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scanned: usize,
    pub optimized: usize,
    pub unchanged: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,

    /// Total individual key changes written
    pub changes_written: usize,

    /// Files that failed, with the reason
    pub failures: Vec<(Utf8PathBuf, String)>,

    /// Set when the operator quit before the last file
    pub stopped_early: bool,

    start_time: Instant,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            scanned: 0,
            optimized: 0,
            unchanged: 0,
            planned: 0,
            skipped: 0,
            failed: 0,
            changes_written: 0,
            failures: Vec::new(),
            stopped_early: false,
            start_time: Instant::now(),
        }
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a scanned file.
    pub fn record(&mut self, path: &Utf8Path, outcome: &FileOutcome) {
        self.scanned += 1;
        match outcome {
            FileOutcome::Optimized { changes } => {
                self.optimized += 1;
                self.changes_written += changes;
            }
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Planned { .. } => self.planned += 1,
            FileOutcome::Skipped(reason) => {
                self.skipped += 1;
                if *reason == SkipReason::Quit {
                    self.stopped_early = true;
                }
            }
            FileOutcome::Failed(reason) => {
                self.failed += 1;
                self.failures.push((path.to_path_buf(), reason.clone()));
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// One-line counter summary for the console.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} scanned", self.scanned),
            format!("{} optimized", self.optimized),
            format!("{} unchanged", self.unchanged),
        ];
        if self.planned > 0 {
            parts.push(format!("{} with pending changes", self.planned));
        }
        parts.push(format!("{} skipped", self.skipped));
        parts.push(format!("{} failed", self.failed));
        parts.join(", ")
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Run Summary ===");
        tracing::info!("Elapsed: {:.2}s", self.elapsed().as_secs_f64());
        tracing::info!("Files: {}", self.summary());
        tracing::info!("Key changes written: {}", self.changes_written);
        if self.stopped_early {
            tracing::info!("Run stopped early by operator");
        }
        for (path, reason) in &self.failures {
            tracing::warn!("Failed: {}: {}", path, reason);
        }
    }
}
