//! Per-row decision loop of a deletion run.
//!
//! Each row is scanned, classified and acted on before the next row is
//! requested; nothing is buffered or reordered across rows, so memory use
//! does not depend on table size.

use std::sync::Arc;

use keyreap_store::{KeyRange, KeyStore, RowKey};
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancel::StopToken;
use crate::classifier::Classification;
use crate::config::{DeleteErrorPolicy, ScanConfiguration};
use crate::cursor::ScanCursor;
use crate::error::{ReapError, Result, RunAborted};
use crate::executor::{DeletionExecutor, RunCounters};
use crate::report::{ProgressReporter, RunReport};
use crate::shard;
use crate::throttle::DeleteThrottle;

/// What the policy does with a classified row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Delete a row matching the delete pattern.
    Delete,
    /// Report a suspect, then delete it.
    DeleteSuspect,
    /// Report a suspect and leave it in place.
    ReportSuspect,
    /// Leave a safe row alone.
    Skip,
}

/// The transition table from classification to action.
pub fn action_for(classification: Classification, delete_suspects: bool) -> Action {
    match (classification, delete_suspects) {
        (Classification::ToDelete, _) => Action::Delete,
        (Classification::Suspect, true) => Action::DeleteSuspect,
        (Classification::Suspect, false) => Action::ReportSuspect,
        (Classification::Safe, _) => Action::Skip,
    }
}

/// Drives scan, classification and deletion for one run.
#[derive(Clone)]
pub struct ClassificationPolicy {
    store: Arc<dyn KeyStore>,
    endpoint: String,
    config: Arc<ScanConfiguration>,
    reporter: Arc<dyn ProgressReporter>,
    stop: StopToken,
}

impl ClassificationPolicy {
    pub fn new(
        store: Arc<dyn KeyStore>,
        endpoint: impl Into<String>,
        config: ScanConfiguration,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            store,
            endpoint: endpoint.into(),
            config: Arc::new(config),
            reporter,
            stop: StopToken::new(),
        }
    }

    /// Uses an externally owned stop token, e.g. one wired to SIGINT.
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    /// Token that stops the run between rows when triggered.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn config(&self) -> &ScanConfiguration {
        &self.config
    }

    /// Runs the scan to exhaustion.
    ///
    /// Counters start from zero. On failure the counters accumulated so far
    /// travel with the error; deletes already applied stay applied.
    pub async fn run(&self) -> std::result::Result<RunReport, RunAborted> {
        let run_id = Uuid::new_v4();
        let span = info_span!("reap", %run_id, table = %self.config.table);
        async move {
            let started = Instant::now();
            let counters = Arc::new(RunCounters::new());
            let throttle = Arc::new(DeleteThrottle::new(self.config.max_deletes_per_sec));
            info!(
                shards = self.config.shards.len(),
                rate_limited = throttle.is_limited(),
                max_deletes_per_sec = self.config.max_deletes_per_sec,
                "starting scan"
            );

            let outcome = match self.config.shards.as_slice() {
                [] => self.run_range(KeyRange::full(), Arc::clone(&counters), throttle).await,
                [only] => self.run_range(only.clone(), Arc::clone(&counters), throttle).await,
                _ => shard::run_sharded(self, Arc::clone(&counters), throttle).await,
            };

            let snap = counters.snapshot();
            let report = RunReport {
                scanned: snap.scanned,
                deleted: snap.deleted,
                suspects: snap.suspects,
                failed_deletes: snap.failed_deletes,
                shards: self.config.shards.len().max(1),
                elapsed: started.elapsed(),
            };
            self.reporter.finished(&report);
            match outcome {
                Ok(()) => Ok(report),
                Err(error) => {
                    error!(error = %error, "run aborted");
                    Err(RunAborted { report, error })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Scans one key range. The cursor is closed on every path once opened.
    pub(crate) async fn run_range(
        &self,
        range: KeyRange,
        counters: Arc<RunCounters>,
        throttle: Arc<DeleteThrottle>,
    ) -> Result<()> {
        let mut cursor =
            ScanCursor::open(self.store.as_ref(), &self.endpoint, &self.config, range).await?;
        let executor = DeletionExecutor::new(
            Arc::clone(&self.store),
            self.config.table.clone(),
            counters,
            Arc::clone(&self.reporter),
            throttle,
            self.config.checkpoint_interval,
        );

        let outcome = self.drain(&mut cursor, &executor).await;
        let range = cursor.range().clone();
        if let Err(e) = cursor.close().await {
            warn!(range = %range, error = %e, "failed to close scanner");
        }
        outcome
    }

    async fn drain(&self, cursor: &mut ScanCursor, executor: &DeletionExecutor) -> Result<()> {
        loop {
            if let Some(reason) = self.stop.stopped() {
                return Err(ReapError::Stopped(reason));
            }
            let Some(row) = cursor.next().await? else {
                return Ok(());
            };
            executor.counters().record_scanned();
            self.apply(&row.key, executor).await?;
        }
    }

    /// Classifies one key and carries out the resulting action.
    async fn apply(&self, key: &RowKey, executor: &DeletionExecutor) -> Result<Action> {
        let classification = self.config.classifier.classify(key);
        let action = action_for(classification, self.config.delete_suspects);
        match action {
            Action::Delete => {
                if self.config.verbose {
                    self.reporter.deleting(key);
                }
                self.delete(key, executor).await?;
            }
            Action::DeleteSuspect => {
                executor.counters().record_suspect();
                if self.config.verbose {
                    self.reporter.suspect(key, true);
                }
                self.delete(key, executor).await?;
            }
            Action::ReportSuspect => {
                executor.counters().record_suspect();
                self.reporter.suspect(key, false);
            }
            Action::Skip => {}
        }
        Ok(action)
    }

    async fn delete(&self, key: &RowKey, executor: &DeletionExecutor) -> Result<()> {
        match executor.delete(key).await {
            Ok(()) => Ok(()),
            Err(e) => {
                executor.counters().record_failed_delete();
                self.reporter.delete_failed(key, &e);
                match self.config.on_delete_error {
                    DeleteErrorPolicy::Skip => Ok(()),
                    DeleteErrorPolicy::Abort => Err(e),
                }
            }
        }
    }
}
