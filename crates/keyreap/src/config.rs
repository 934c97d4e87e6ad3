//! Run configuration: the operator-facing settings and their compiled,
//! immutable form.

use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use keyreap_store::{ClientOptions, KeyFilter, KeyRange, RowKey, ScanRequest, StoreCapabilities};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classifier::PatternClassifier;
use crate::error::{ReapError, Result};

/// What to do when a single-row delete fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeleteErrorPolicy {
    /// Log the failure, count it, leave the row in place and continue.
    #[default]
    Skip,
    /// Close the cursor and end the run with the delete error.
    Abort,
}

/// Operator settings, as read from a config file and command line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReapConfig {
    pub endpoint: String,
    pub table: String,
    pub delete_pattern: String,
    pub suspect_antipattern: String,
    pub delete_suspects: bool,
    pub use_server_pushdown: bool,
    pub verbose: bool,
    pub batch_size: usize,
    pub prefetch_size: usize,
    pub cache_blocks: bool,
    pub scanner_lease_timeout_secs: u64,
    pub rpc_timeout_secs: u64,
    pub checkpoint_interval: u64,
    pub max_deletes_per_sec: u64,
    pub on_delete_error: DeleteErrorPolicy,
    pub split_keys: Vec<String>,
}

impl Default for ReapConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("memory:"),
            table: String::from("my_big_table"),
            delete_pattern: String::from(r"yyyymmddhh=201[0-5]\d+$"),
            suspect_antipattern: String::new(),
            delete_suspects: false,
            use_server_pushdown: false,
            verbose: false,
            batch_size: 5_000,
            prefetch_size: 50_000,
            cache_blocks: false,
            scanner_lease_timeout_secs: 60 * 60,
            rpc_timeout_secs: 60 * 60,
            checkpoint_interval: 100_000,
            max_deletes_per_sec: 0,
            on_delete_error: DeleteErrorPolicy::Skip,
            split_keys: Vec::new(),
        }
    }
}

impl ReapConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: ReapConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: ReapConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            scanner_lease_timeout: Duration::from_secs(self.scanner_lease_timeout_secs),
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
        }
    }

    /// Validates the settings and compiles them. Every check here runs
    /// before the store is contacted.
    pub fn compile(&self) -> Result<ScanConfiguration> {
        if self.table.trim().is_empty() {
            return Err(ReapError::Configuration {
                reason: "target table is missing".to_string(),
            });
        }
        if self.batch_size == 0 || self.prefetch_size == 0 {
            return Err(ReapError::Configuration {
                reason: "batch size and prefetch size must be positive".to_string(),
            });
        }
        if self.cache_blocks {
            return Err(ReapError::Configuration {
                reason: "block caching must stay off for a one-pass delete scan".to_string(),
            });
        }
        if self.checkpoint_interval == 0 {
            return Err(ReapError::Configuration {
                reason: "checkpoint interval must be positive".to_string(),
            });
        }
        if self.scanner_lease_timeout_secs == 0 || self.rpc_timeout_secs == 0 {
            return Err(ReapError::Configuration {
                reason: "scanner lease and rpc timeouts must be positive".to_string(),
            });
        }
        let classifier = PatternClassifier::new(&self.delete_pattern, &self.suspect_antipattern)?;
        let shards = shard_ranges(&self.split_keys)?;

        if self.use_server_pushdown && classifier.suspect_antipattern().is_some() {
            warn!("server pushdown only returns rows matching the delete pattern; suspects cannot be detected");
        }
        if self.use_server_pushdown && classifier.delete_pattern().is_none() {
            warn!("server pushdown requested with an empty delete pattern; nothing will be pushed down");
        }

        Ok(ScanConfiguration {
            table: self.table.clone(),
            batch_size: self.batch_size,
            prefetch_size: self.prefetch_size,
            use_server_pushdown: self.use_server_pushdown,
            cache_blocks: self.cache_blocks,
            classifier,
            delete_suspects: self.delete_suspects,
            verbose: self.verbose,
            checkpoint_interval: self.checkpoint_interval,
            max_deletes_per_sec: self.max_deletes_per_sec,
            on_delete_error: self.on_delete_error,
            shards,
        })
    }
}

/// Splits the key space at `split_keys` into disjoint, covering ranges.
fn shard_ranges(split_keys: &[String]) -> Result<Vec<KeyRange>> {
    if split_keys.iter().any(String::is_empty) {
        return Err(ReapError::Configuration {
            reason: "split keys must not be empty".to_string(),
        });
    }
    if split_keys.windows(2).any(|w| w[0].as_bytes() >= w[1].as_bytes()) {
        return Err(ReapError::Configuration {
            reason: "split keys must be strictly increasing".to_string(),
        });
    }
    let mut bounds: Vec<Option<RowKey>> = Vec::with_capacity(split_keys.len() + 2);
    bounds.push(None);
    bounds.extend(split_keys.iter().map(|k| Some(RowKey::from(k.as_str()))));
    bounds.push(None);
    Ok(bounds
        .windows(2)
        .map(|w| KeyRange::new(w[0].clone(), w[1].clone()))
        .collect())
}

/// Compiled, immutable settings for one run.
#[derive(Debug, Clone)]
pub struct ScanConfiguration {
    pub table: String,
    pub batch_size: usize,
    pub prefetch_size: usize,
    pub use_server_pushdown: bool,
    pub cache_blocks: bool,
    pub classifier: PatternClassifier,
    pub delete_suspects: bool,
    pub verbose: bool,
    pub checkpoint_interval: u64,
    pub max_deletes_per_sec: u64,
    pub on_delete_error: DeleteErrorPolicy,
    /// Disjoint ranges covering the key space, one pipeline each.
    pub shards: Vec<KeyRange>,
}

impl ScanConfiguration {
    /// Builds the scan request for `range`, pushing the delete pattern down
    /// only when asked to and when the store can evaluate it.
    pub fn scan_request(&self, range: KeyRange, caps: StoreCapabilities) -> ScanRequest {
        let filter = match self.classifier.delete_pattern() {
            Some(pattern) if self.use_server_pushdown && caps.row_filter => {
                Some(KeyFilter::Regex(pattern.to_string()))
            }
            _ => None,
        };
        ScanRequest {
            table: self.table.clone(),
            range,
            batch_size: self.batch_size,
            prefetch_size: self.prefetch_size,
            cache_blocks: self.cache_blocks,
            key_only: caps.key_only,
            filter,
        }
    }
}
