//! Progress reporting and the final run tally.
//!
//! The progress log is the only artifact a run leaves behind, so every
//! line goes through [`ProgressReporter`]. [`TracingReporter`] writes it to
//! the process log; [`CollectingReporter`] keeps it in memory.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use keyreap_store::RowKey;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ReapError;

/// Final (or partial) counters of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub scanned: u64,
    pub deleted: u64,
    pub suspects: u64,
    pub failed_deletes: u64,
    pub shards: usize,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl RunReport {
    /// Deletes per second over the whole run.
    pub fn delete_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.deleted as f64 / secs
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows scanned, {} rows deleted, {} suspects, {} failed deletes",
            self.scanned, self.deleted, self.suspects, self.failed_deletes
        )
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Sink for the run's progress lines.
pub trait ProgressReporter: Send + Sync {
    /// A row matching the delete pattern is about to be deleted (verbose only).
    fn deleting(&self, key: &RowKey);
    /// A suspect row was seen; `will_delete` is true in delete-suspects mode.
    fn suspect(&self, key: &RowKey, will_delete: bool);
    /// `deleted` crossed a checkpoint boundary.
    fn checkpoint(&self, deleted: u64);
    /// A delete failed.
    fn delete_failed(&self, key: &RowKey, error: &ReapError);
    /// The run ended, successfully or not.
    fn finished(&self, report: &RunReport);
}

/// Writes progress to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn deleting(&self, key: &RowKey) {
        info!(key = %key, "deleting");
    }

    fn suspect(&self, key: &RowKey, will_delete: bool) {
        warn!(key = %key, will_delete, "suspect key");
    }

    fn checkpoint(&self, deleted: u64) {
        info!("{} rows deleted", deleted);
    }

    fn delete_failed(&self, key: &RowKey, error: &ReapError) {
        warn!(key = %key, error = %error, "delete failed, row left in place");
    }

    fn finished(&self, report: &RunReport) {
        info!(
            scanned = report.scanned,
            suspects = report.suspects,
            failed_deletes = report.failed_deletes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            deletes_per_sec = report.delete_rate(),
            "Final count: {} rows deleted",
            report.deleted
        );
    }
}

/// One recorded progress line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Deleting(RowKey),
    Suspect { key: RowKey, will_delete: bool },
    Checkpoint(u64),
    DeleteFailed(RowKey),
    Finished(RunReport),
}

/// Keeps every progress line in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.lock().clone()
    }

    pub fn checkpoints(&self) -> Vec<u64> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Checkpoint(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn suspects(&self) -> Vec<(RowKey, bool)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Suspect { key, will_delete } => Some((key.clone(), *will_delete)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ProgressEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProgressEvent>> {
        self.events.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl ProgressReporter for CollectingReporter {
    fn deleting(&self, key: &RowKey) {
        self.push(ProgressEvent::Deleting(key.clone()));
    }

    fn suspect(&self, key: &RowKey, will_delete: bool) {
        self.push(ProgressEvent::Suspect {
            key: key.clone(),
            will_delete,
        });
    }

    fn checkpoint(&self, deleted: u64) {
        self.push(ProgressEvent::Checkpoint(deleted));
    }

    fn delete_failed(&self, key: &RowKey, _error: &ReapError) {
        self.push(ProgressEvent::DeleteFailed(key.clone()));
    }

    fn finished(&self, report: &RunReport) {
        self.push(ProgressEvent::Finished(report.clone()));
    }
}
