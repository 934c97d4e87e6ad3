//! Forward, cache-bypassing, batched iteration over a key range.
//!
//! The cursor owns one server-side scanner. Rows arrive a batch per round
//! trip and are handed out one at a time in key order. `close` consumes the
//! cursor, so a cursor cannot be closed twice; callers must still reach it
//! on every exit path or the scanner's lease is held until it times out.

use std::collections::VecDeque;

use keyreap_store::{KeyRange, KeyStore, Row, Scanner};
use tracing::{debug, warn};

use crate::config::ScanConfiguration;
use crate::error::{ReapError, Result};

/// Open scan over one key range of the target table.
pub struct ScanCursor {
    scanner: Box<dyn Scanner>,
    buffer: VecDeque<Row>,
    table: String,
    range: KeyRange,
    exhausted: bool,
    batches: u64,
    pushed_down: bool,
}

impl ScanCursor {
    /// Opens a scanner over `range`.
    ///
    /// `endpoint` only labels connectivity errors.
    pub async fn open(
        store: &dyn KeyStore,
        endpoint: &str,
        cfg: &ScanConfiguration,
        range: KeyRange,
    ) -> Result<Self> {
        let caps = store.capabilities();
        if cfg.use_server_pushdown && cfg.classifier.delete_pattern().is_some() && !caps.row_filter {
            warn!(
                table = %cfg.table,
                "store cannot evaluate key filters, falling back to client-side filtering"
            );
        }
        let request = cfg.scan_request(range.clone(), caps);
        let pushed_down = request.filter.is_some();
        debug!(
            table = %cfg.table,
            range = %range,
            batch_size = request.batch_size,
            prefetch_size = request.prefetch_size,
            key_only = request.key_only,
            pushed_down,
            "opening scan"
        );
        let scanner = store
            .open_scanner(request)
            .await
            .map_err(|e| ReapError::from_open(endpoint, &cfg.table, e))?;

        Ok(Self {
            scanner,
            buffer: VecDeque::with_capacity(cfg.batch_size.min(8192)),
            table: cfg.table.clone(),
            range,
            exhausted: false,
            batches: 0,
            pushed_down,
        })
    }

    /// Next row in key order, or `None` once the range is exhausted.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        if let Some(row) = self.buffer.pop_front() {
            return Ok(Some(row));
        }
        // A filtered batch may come back empty only at the end of the scan,
        // so one fetch per call is enough.
        if self.exhausted {
            return Ok(None);
        }
        let batch = self
            .scanner
            .next_batch()
            .await
            .map_err(|source| ReapError::Scan {
                table: self.table.clone(),
                source,
            })?;
        self.batches += 1;
        if batch.is_empty() {
            self.exhausted = true;
            debug!(table = %self.table, range = %self.range, batches = self.batches, "scan exhausted");
            return Ok(None);
        }
        self.buffer.extend(batch);
        Ok(self.buffer.pop_front())
    }

    /// True when the delete pattern is evaluated server-side.
    pub fn is_pushed_down(&self) -> bool {
        self.pushed_down
    }

    /// The range this cursor covers.
    pub fn range(&self) -> &KeyRange {
        &self.range
    }

    /// Releases the server-side scanner.
    pub async fn close(mut self) -> Result<()> {
        self.buffer.clear();
        self.scanner
            .close()
            .await
            .map_err(|source| ReapError::Scan {
                table: self.table.clone(),
                source,
            })
    }
}
