//! In-process sorted key-value store.
//!
//! Tables are BTreeMaps behind an RwLock, so scans see keys in byte order
//! and deletes interleave safely with open scanners. Scanners resume from
//! the last key they examined rather than holding a snapshot, which is how
//! a region-server scanner behaves with respect to concurrent deletes.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use regex::bytes::Regex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::client::{ClientOptions, KeyFilter, KeyStore, ScanRequest, Scanner, StoreCapabilities};
use crate::error::{Result, StoreError};
use crate::types::{Cell, KeyRange, Row, RowKey};

type Table = BTreeMap<Vec<u8>, Vec<Cell>>;
type Tables = Arc<RwLock<HashMap<String, Table>>>;

/// In-memory store backed by one BTreeMap per table. Thread-safe via RwLock.
#[derive(Clone)]
pub struct MemoryKeyStore {
    tables: Tables,
    options: ClientOptions,
    capabilities: StoreCapabilities,
    open_scanners: Arc<AtomicUsize>,
}

impl MemoryKeyStore {
    /// Creates an empty store with default client options.
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    /// Creates an empty store enforcing the given lease and RPC timeouts.
    pub fn with_options(options: ClientOptions) -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            options,
            capabilities: StoreCapabilities {
                row_filter: true,
                key_only: true,
            },
            open_scanners: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Overrides the advertised capabilities, e.g. to model a store
    /// without filter pushdown.
    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Creates `table` if it does not exist yet.
    pub fn create_table(&self, table: &str) -> Result<()> {
        let mut tables = self.write()?;
        tables.entry(table.to_string()).or_default();
        Ok(())
    }

    /// Inserts or replaces a row.
    pub fn put(&self, table: &str, key: impl Into<RowKey>, cells: Vec<Cell>) -> Result<()> {
        let key = key.into();
        let mut tables = self.write()?;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        rows.insert(key.as_bytes().to_vec(), cells);
        Ok(())
    }

    /// Inserts a row with a single placeholder cell.
    pub fn put_key(&self, table: &str, key: impl Into<RowKey>) -> Result<()> {
        let cell = Cell {
            family: Bytes::from_static(b"d"),
            qualifier: Bytes::from_static(b"v"),
            value: Bytes::from_static(b"1"),
        };
        self.put(table, key, vec![cell])
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        let tables = self.read()?;
        tables
            .get(table)
            .map(BTreeMap::len)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    /// Returns true if `table` holds `key`.
    pub fn contains(&self, table: &str, key: &[u8]) -> Result<bool> {
        let tables = self.read()?;
        tables
            .get(table)
            .map(|rows| rows.contains_key(key))
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    /// All keys of `table` in order.
    pub fn keys(&self, table: &str) -> Result<Vec<RowKey>> {
        let tables = self.read()?;
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(rows.keys().map(|k| RowKey::from(k.as_slice())).collect())
    }

    /// Scanners opened and not yet closed.
    pub fn open_scanner_count(&self) -> usize {
        self.open_scanners.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Table>>> {
        self.tables
            .read()
            .map_err(|e| StoreError::Server(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Table>>> {
        self.tables
            .write()
            .map_err(|e| StoreError::Server(e.to_string()))
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn open_scanner(&self, request: ScanRequest) -> Result<Box<dyn Scanner>> {
        if !self.read()?.contains_key(&request.table) {
            return Err(StoreError::TableNotFound(request.table));
        }
        let filter = match &request.filter {
            Some(KeyFilter::Regex(pattern)) if self.capabilities.row_filter => {
                let re = Regex::new(pattern).map_err(|e| StoreError::InvalidFilter {
                    reason: e.to_string(),
                })?;
                Some(re)
            }
            _ => None,
        };
        debug!(
            table = %request.table,
            range = %request.range,
            batch_size = request.batch_size,
            cache_blocks = request.cache_blocks,
            "opening memory scanner"
        );
        self.open_scanners.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryScanner {
            tables: Arc::clone(&self.tables),
            table: request.table,
            range: request.range,
            batch_size: request.batch_size.max(1),
            key_only: request.key_only && self.capabilities.key_only,
            filter,
            resume_after: None,
            exhausted: false,
            closed: false,
            lease: self.options.scanner_lease_timeout,
            last_activity: Instant::now(),
            open_scanners: Arc::clone(&self.open_scanners),
        }))
    }

    async fn delete(&self, table: &str, key: &RowKey) -> Result<()> {
        let mut tables = self.write()?;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        rows.remove(key.as_bytes());
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }
}

struct MemoryScanner {
    tables: Tables,
    table: String,
    range: KeyRange,
    batch_size: usize,
    key_only: bool,
    filter: Option<Regex>,
    // Last key examined, whether or not it passed the filter.
    resume_after: Option<Vec<u8>>,
    exhausted: bool,
    closed: bool,
    lease: std::time::Duration,
    last_activity: Instant,
    open_scanners: Arc<AtomicUsize>,
}

impl MemoryScanner {
    fn lower_bound(&self) -> Bound<&[u8]> {
        match (&self.resume_after, &self.range.start) {
            (Some(last), _) => Bound::Excluded(last.as_slice()),
            (None, Some(start)) => Bound::Included(start.as_bytes()),
            (None, None) => Bound::Unbounded,
        }
    }

    fn range_is_empty(&self) -> bool {
        let low = match self.lower_bound() {
            Bound::Included(k) | Bound::Excluded(k) => k,
            Bound::Unbounded => return false,
        };
        self.range
            .end
            .as_ref()
            .map_or(false, |end| low >= end.as_bytes())
    }

    fn project(&self, cells: &[Cell]) -> Vec<Cell> {
        if !self.key_only {
            return cells.to_vec();
        }
        cells
            .first()
            .map(|c| Cell {
                family: c.family.clone(),
                qualifier: c.qualifier.clone(),
                value: Bytes::new(),
            })
            .into_iter()
            .collect()
    }
}

#[async_trait]
impl Scanner for MemoryScanner {
    async fn next_batch(&mut self) -> Result<Vec<Row>> {
        if self.closed {
            return Err(StoreError::ScannerClosed);
        }
        let now = Instant::now();
        if now.duration_since(self.last_activity) > self.lease {
            return Err(StoreError::LeaseExpired {
                lease_ms: self.lease.as_millis() as u64,
            });
        }
        self.last_activity = now;
        if self.exhausted || self.range_is_empty() {
            self.exhausted = true;
            return Ok(Vec::new());
        }

        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Server(e.to_string()))?;
        let rows = tables
            .get(&self.table)
            .ok_or_else(|| StoreError::TableNotFound(self.table.clone()))?;
        let upper = match &self.range.end {
            Some(end) => Bound::Excluded(end.as_bytes()),
            None => Bound::Unbounded,
        };

        let mut batch = Vec::with_capacity(self.batch_size.min(1024));
        let mut last_seen = None;
        let mut reached_end = true;
        for (key, cells) in rows.range::<[u8], _>((self.lower_bound(), upper)) {
            if batch.len() == self.batch_size {
                reached_end = false;
                break;
            }
            last_seen = Some(key.clone());
            if let Some(re) = &self.filter {
                if !re.is_match(key) {
                    continue;
                }
            }
            batch.push(Row {
                key: RowKey::from(key.as_slice()),
                cells: self.project(cells),
            });
        }
        drop(tables);

        if let Some(last) = last_seen {
            self.resume_after = Some(last);
        }
        self.exhausted = reached_end;
        Ok(batch)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(StoreError::ScannerClosed);
        }
        self.closed = true;
        self.open_scanners.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemoryScanner {
    fn drop(&mut self) {
        if !self.closed {
            warn!(table = %self.table, "scanner dropped without close, lease held until timeout");
        }
    }
}
