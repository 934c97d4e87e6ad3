//! Single-row deletes and the run counters they drive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use keyreap_store::{KeyStore, RowKey};

use crate::error::{ReapError, Result};
use crate::report::ProgressReporter;
use crate::throttle::DeleteThrottle;

/// Counters of one run. Shared by every shard pipeline of the run, so each
/// update is a single atomic increment.
#[derive(Debug, Default)]
pub struct RunCounters {
    scanned: AtomicU64,
    deleted: AtomicU64,
    suspects: AtomicU64,
    failed_deletes: AtomicU64,
}

/// Point-in-time copy of [`RunCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub scanned: u64,
    pub deleted: u64,
    pub suspects: u64,
    pub failed_deletes: u64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scanned(&self) -> u64 {
        self.scanned.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the new deleted total.
    pub fn record_deleted(&self) -> u64 {
        self.deleted.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_suspect(&self) -> u64 {
        self.suspects.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_failed_delete(&self) -> u64 {
        self.failed_deletes.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            scanned: self.scanned.load(Ordering::SeqCst),
            deleted: self.deleted.load(Ordering::SeqCst),
            suspects: self.suspects.load(Ordering::SeqCst),
            failed_deletes: self.failed_deletes.load(Ordering::SeqCst),
        }
    }
}

/// Issues one non-transactional delete per row and keeps the deleted
/// count. Failures are returned to the caller, never retried here.
pub struct DeletionExecutor {
    store: Arc<dyn KeyStore>,
    table: String,
    counters: Arc<RunCounters>,
    reporter: Arc<dyn ProgressReporter>,
    throttle: Arc<DeleteThrottle>,
    checkpoint_interval: u64,
}

impl DeletionExecutor {
    pub fn new(
        store: Arc<dyn KeyStore>,
        table: impl Into<String>,
        counters: Arc<RunCounters>,
        reporter: Arc<dyn ProgressReporter>,
        throttle: Arc<DeleteThrottle>,
        checkpoint_interval: u64,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            counters,
            reporter,
            throttle,
            checkpoint_interval: checkpoint_interval.max(1),
        }
    }

    /// Deletes `key`. On success the deleted count goes up by one and a
    /// checkpoint line is emitted whenever the total reaches a multiple of
    /// the checkpoint interval.
    pub async fn delete(&self, key: &RowKey) -> Result<()> {
        self.throttle.acquire().await;
        self.store
            .delete(&self.table, key)
            .await
            .map_err(|source| ReapError::Delete {
                key: key.clone(),
                source,
            })?;
        let total = self.counters.record_deleted();
        if total % self.checkpoint_interval == 0 {
            self.report_progress(total);
        }
        Ok(())
    }

    /// Emits a checkpoint line for `deleted` rows.
    pub fn report_progress(&self, deleted: u64) {
        self.reporter.checkpoint(deleted);
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingReporter;
    use keyreap_store::testing::FaultyKeyStore;
    use keyreap_store::MemoryKeyStore;

    fn executor(
        store: Arc<dyn KeyStore>,
        reporter: Arc<CollectingReporter>,
        interval: u64,
    ) -> DeletionExecutor {
        DeletionExecutor::new(
            store,
            "t",
            Arc::new(RunCounters::new()),
            reporter,
            Arc::new(DeleteThrottle::unlimited()),
            interval,
        )
    }

    #[tokio::test]
    async fn test_delete_counts_and_checkpoints() {
        let store = MemoryKeyStore::new();
        store.create_table("t").unwrap();
        for i in 0..7 {
            store.put_key("t", format!("k{i}")).unwrap();
        }
        let reporter = Arc::new(CollectingReporter::new());
        let exec = executor(Arc::new(store.clone()), Arc::clone(&reporter), 3);
        for i in 0..7 {
            exec.delete(&RowKey::from(format!("k{i}"))).await.unwrap();
        }
        assert_eq!(exec.counters().snapshot().deleted, 7);
        assert_eq!(reporter.checkpoints(), vec![3, 6]);
        assert_eq!(store.row_count("t").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_absent_key_succeeds() {
        let store = MemoryKeyStore::new();
        store.create_table("t").unwrap();
        let reporter = Arc::new(CollectingReporter::new());
        let exec = executor(Arc::new(store), reporter, 100);
        exec.delete(&RowKey::from("never-existed")).await.unwrap();
        assert_eq!(exec.counters().snapshot().deleted, 1);
        assert_eq!(exec.counters().snapshot().failed_deletes, 0);
    }

    #[tokio::test]
    async fn test_failure_is_surfaced_not_counted() {
        let store = MemoryKeyStore::new();
        store.create_table("t").unwrap();
        store.put_key("t", "bad").unwrap();
        let faulty = FaultyKeyStore::new(store);
        faulty.fail_delete_of("bad");
        let reporter = Arc::new(CollectingReporter::new());
        let exec = executor(Arc::new(faulty.clone()), reporter, 1);

        let err = exec.delete(&RowKey::from("bad")).await.unwrap_err();
        assert!(matches!(err, ReapError::Delete { ref key, .. } if key == &RowKey::from("bad")));
        assert_eq!(exec.counters().snapshot().deleted, 0);
        assert_eq!(faulty.delete_calls(), 1);
        assert!(faulty.inner().contains("t", b"bad").unwrap());
    }

    #[tokio::test]
    async fn test_counters_are_safe_across_tasks() {
        let counters = Arc::new(RunCounters::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&counters);
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    c.record_deleted();
                    c.record_scanned();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let snap = counters.snapshot();
        assert_eq!(snap.deleted, 8000);
        assert_eq!(snap.scanned, 8000);
    }
}
