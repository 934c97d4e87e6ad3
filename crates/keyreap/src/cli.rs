use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::{DeleteErrorPolicy, ReapConfig};

#[derive(Parser, Debug)]
#[command(name = "keyreap")]
#[command(
    about = "Deletes rows whose key matches a pattern, one row at a time, without pressuring the store",
    long_about = None
)]
pub struct Cli {
    /// TOML or JSON file with defaults for every option below
    #[arg(short, long, env = "KEYREAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Store endpoint: `memory:`, `dump:<path>` or the store's `host:port`
    #[arg(short, long, env = "KEYREAP_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Table to delete records from
    #[arg(short, long)]
    pub table: Option<String>,

    /// Pattern of the keys to delete
    #[arg(short, long)]
    pub delete_pattern: Option<String>,

    /// Evaluate the delete pattern on the store's serving nodes (less network, more server CPU)
    #[arg(short = 'f', long)]
    pub use_row_filter: bool,

    /// Keys matching neither the delete pattern nor this pattern are reported as suspects; empty disables
    #[arg(short = 's', long)]
    pub non_suspect_pattern: Option<String>,

    /// Also delete keys detected as suspects
    #[arg(short = 'k', long)]
    pub delete_suspect_keys: bool,

    /// Log every delete
    #[arg(short, long)]
    pub verbose: bool,

    /// Rows per scanner round trip
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Rows cached server-side ahead of consumption
    #[arg(long)]
    pub prefetch_size: Option<usize>,

    /// Upper bound on deletes per second; 0 is unlimited
    #[arg(long)]
    pub max_deletes_per_sec: Option<u64>,

    /// What to do when a single delete fails
    #[arg(long, value_enum)]
    pub on_delete_error: Option<DeleteErrorPolicy>,

    /// Split the key space at this key and scan the parts concurrently (repeatable)
    #[arg(long = "split-key")]
    pub split_keys: Vec<String>,

    /// Scanner lease timeout in seconds
    #[arg(long)]
    pub lease_timeout_secs: Option<u64>,

    /// RPC timeout in seconds
    #[arg(long)]
    pub rpc_timeout_secs: Option<u64>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    pub report_json: bool,
}

impl Cli {
    /// Reads the config file if given, then applies flags on top.
    pub fn resolve(&self) -> Result<ReapConfig> {
        let mut config = match &self.config {
            Some(path) => ReapConfig::from_file(path)?,
            None => ReapConfig::default(),
        };
        if let Some(v) = &self.endpoint {
            config.endpoint = v.clone();
        }
        if let Some(v) = &self.table {
            config.table = v.clone();
        }
        if let Some(v) = &self.delete_pattern {
            config.delete_pattern = v.clone();
        }
        if let Some(v) = &self.non_suspect_pattern {
            config.suspect_antipattern = v.clone();
        }
        config.use_server_pushdown |= self.use_row_filter;
        config.delete_suspects |= self.delete_suspect_keys;
        config.verbose |= self.verbose;
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.prefetch_size {
            config.prefetch_size = v;
        }
        if let Some(v) = self.max_deletes_per_sec {
            config.max_deletes_per_sec = v;
        }
        if let Some(v) = self.on_delete_error {
            config.on_delete_error = v;
        }
        if !self.split_keys.is_empty() {
            config.split_keys = self.split_keys.clone();
        }
        if let Some(v) = self.lease_timeout_secs {
            config.scanner_lease_timeout_secs = v;
        }
        if let Some(v) = self.rpc_timeout_secs {
            config.rpc_timeout_secs = v;
        }
        Ok(config)
    }
}
