//! Fault injection for exercising error paths of store consumers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{KeyStore, ScanRequest, Scanner, StoreCapabilities};
use crate::error::{Result, StoreError};
use crate::memory::MemoryKeyStore;
use crate::types::{Row, RowKey};

/// Failure to inject.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Store cannot be reached.
    Unreachable,
    /// Scanner lease expired.
    LeaseExpired,
    /// RPC timed out.
    Timeout,
    /// Connection dropped.
    ConnectionLost,
}

impl Fault {
    fn to_error(self) -> StoreError {
        match self {
            Fault::Unreachable => StoreError::Unreachable {
                endpoint: "faulty".to_string(),
                reason: "injected".to_string(),
            },
            Fault::LeaseExpired => StoreError::LeaseExpired { lease_ms: 0 },
            Fault::Timeout => StoreError::Timeout { timeout_ms: 0 },
            Fault::ConnectionLost => StoreError::ConnectionLost {
                reason: "injected".to_string(),
            },
        }
    }
}

#[derive(Default)]
struct FaultState {
    open_fault: Mutex<Option<Fault>>,
    scan_fault_after: Mutex<Option<(usize, Fault)>>,
    failing_deletes: Mutex<HashSet<Vec<u8>>>,
    lost_acks: Mutex<HashSet<Vec<u8>>>,
    scanners_opened: AtomicUsize,
    close_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    last_request: Mutex<Option<ScanRequest>>,
}

/// A [`MemoryKeyStore`] wrapper that injects failures and counts calls.
#[derive(Clone)]
pub struct FaultyKeyStore {
    inner: MemoryKeyStore,
    state: Arc<FaultState>,
}

impl FaultyKeyStore {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: MemoryKeyStore) -> Self {
        Self {
            inner,
            state: Arc::new(FaultState::default()),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &MemoryKeyStore {
        &self.inner
    }

    /// Make every `open_scanner` fail.
    pub fn fail_open(&self, fault: Fault) {
        *lock(&self.state.open_fault) = Some(fault);
    }

    /// Make scanners fail once `rows` rows have been yielded.
    pub fn fail_scan_after(&self, rows: usize, fault: Fault) {
        *lock(&self.state.scan_fault_after) = Some((rows, fault));
    }

    /// Make deletes of `key` fail without deleting.
    pub fn fail_delete_of(&self, key: impl AsRef<[u8]>) {
        lock(&self.state.failing_deletes).insert(key.as_ref().to_vec());
    }

    /// Make deletes of `key` succeed server-side but report a timeout.
    pub fn lose_ack_of(&self, key: impl AsRef<[u8]>) {
        lock(&self.state.lost_acks).insert(key.as_ref().to_vec());
    }

    /// Scanners opened so far.
    pub fn scanners_opened(&self) -> usize {
        self.state.scanners_opened.load(Ordering::SeqCst)
    }

    /// `Scanner::close` calls observed so far.
    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// `delete` calls observed so far, failed ones included.
    pub fn delete_calls(&self) -> usize {
        self.state.delete_calls.load(Ordering::SeqCst)
    }

    /// The most recent scan request.
    pub fn last_request(&self) -> Option<ScanRequest> {
        lock(&self.state.last_request).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl KeyStore for FaultyKeyStore {
    async fn open_scanner(&self, request: ScanRequest) -> Result<Box<dyn Scanner>> {
        *lock(&self.state.last_request) = Some(request.clone());
        if let Some(fault) = *lock(&self.state.open_fault) {
            return Err(fault.to_error());
        }
        let inner = self.inner.open_scanner(request).await?;
        self.state.scanners_opened.fetch_add(1, Ordering::SeqCst);
        let fault_after = *lock(&self.state.scan_fault_after);
        Ok(Box::new(FaultyScanner {
            inner,
            state: Arc::clone(&self.state),
            yielded: 0,
            fault_after,
        }))
    }

    async fn delete(&self, table: &str, key: &RowKey) -> Result<()> {
        self.state.delete_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.state.failing_deletes).contains(key.as_bytes()) {
            return Err(Fault::Timeout.to_error());
        }
        if lock(&self.state.lost_acks).contains(key.as_bytes()) {
            self.inner.delete(table, key).await?;
            return Err(Fault::Timeout.to_error());
        }
        self.inner.delete(table, key).await
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }
}

struct FaultyScanner {
    inner: Box<dyn Scanner>,
    state: Arc<FaultState>,
    yielded: usize,
    fault_after: Option<(usize, Fault)>,
}

#[async_trait]
impl Scanner for FaultyScanner {
    async fn next_batch(&mut self) -> Result<Vec<Row>> {
        if let Some((limit, fault)) = self.fault_after {
            if self.yielded >= limit {
                return Err(fault.to_error());
            }
            let mut batch = self.inner.next_batch().await?;
            batch.truncate(limit - self.yielded);
            self.yielded += batch.len();
            return Ok(batch);
        }
        let batch = self.inner.next_batch().await?;
        self.yielded += batch.len();
        Ok(batch)
    }

    async fn close(&mut self) -> Result<()> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}
