//! Abstract store client.
//!
//! This module defines the KeyStore and Scanner traits that every store
//! backend implements: a forward range scan with an optional server-pushed
//! key predicate, and a single-row delete.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{KeyRange, Row, RowKey};

/// Default rows transferred per scanner round trip.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;
/// Default rows the server caches ahead of consumption.
pub const DEFAULT_PREFETCH_SIZE: usize = 50_000;
/// Default scanner lease and RPC timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// A key predicate the store may evaluate on its serving nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyFilter {
    /// Keep rows whose key matches the regular expression.
    Regex(String),
}

/// Optional features a backend supports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// The store can evaluate a [`KeyFilter`] server-side.
    pub row_filter: bool,
    /// The store can return keys without cell values.
    pub key_only: bool,
}

/// Session-level client settings handed to the store at connect time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long an idle scanner keeps its server-side lease.
    pub scanner_lease_timeout: Duration,
    /// Per-RPC timeout.
    pub rpc_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            scanner_lease_timeout: DEFAULT_TIMEOUT,
            rpc_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Parameters of one forward range scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanRequest {
    /// Table to scan.
    pub table: String,
    /// Key range to cover.
    pub range: KeyRange,
    /// Rows per round trip.
    pub batch_size: usize,
    /// Rows cached server-side ahead of consumption.
    pub prefetch_size: usize,
    /// Whether scanned blocks may populate the store's block cache.
    pub cache_blocks: bool,
    /// Ask for keys only, without cell values.
    pub key_only: bool,
    /// Predicate to push to the store, if any.
    pub filter: Option<KeyFilter>,
}

impl ScanRequest {
    /// A full-table, key-only, cache-bypassing scan with default sizes.
    pub fn full_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            range: KeyRange::full(),
            batch_size: DEFAULT_BATCH_SIZE,
            prefetch_size: DEFAULT_PREFETCH_SIZE,
            cache_blocks: false,
            key_only: true,
            filter: None,
        }
    }
}

/// Sorted key-value store client.
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    /// Open a forward scanner over `request.range`.
    ///
    /// Fails with a connectivity error if the store cannot be reached, or
    /// [`crate::StoreError::TableNotFound`] for an unknown table.
    async fn open_scanner(&self, request: ScanRequest) -> Result<Box<dyn Scanner>>;

    /// Delete a single row. Deleting an absent row succeeds.
    async fn delete(&self, table: &str, key: &RowKey) -> Result<()>;

    /// Features this backend supports.
    fn capabilities(&self) -> StoreCapabilities;
}

/// An open server-side scanner.
#[async_trait]
pub trait Scanner: Send {
    /// Fetch the next batch of rows in ascending key order.
    ///
    /// An empty batch means the scan is exhausted.
    async fn next_batch(&mut self) -> Result<Vec<Row>>;

    /// Release server-side scanner resources.
    async fn close(&mut self) -> Result<()>;
}
