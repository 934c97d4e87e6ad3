//! keyreap: throttled, pattern-driven bulk deletion of rows from a sorted
//! key-value table.
//!
//! Pipeline: ScanCursor → PatternClassifier → ClassificationPolicy →
//! DeletionExecutor → RunCounters / RunReport
//!
//! Rows are scanned once in key order, bypassing the store's block cache.
//! Keys matching the delete pattern are deleted one at a time; keys that
//! match neither the delete pattern nor the known-safe antipattern are
//! reported as suspects and deleted only on request.

use std::sync::Arc;

pub mod cancel;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod policy;
pub mod report;
mod shard;
pub mod throttle;

pub use cancel::{StopReason, StopToken};
pub use classifier::{Classification, PatternClassifier};
pub use config::{DeleteErrorPolicy, ReapConfig, ScanConfiguration};
pub use cursor::ScanCursor;
pub use error::{ReapError, RunAborted};
pub use executor::{CounterSnapshot, DeletionExecutor, RunCounters};
pub use policy::{action_for, Action, ClassificationPolicy};
pub use report::{CollectingReporter, ProgressEvent, ProgressReporter, RunReport, TracingReporter};
pub use throttle::{DeleteThrottle, TokenBucket};

use keyreap_store::{connect, StoreEndpoint};

/// Compiles `config`, connects to its endpoint and runs the deletion.
///
/// Configuration and connectivity failures happen before any row is
/// scanned and come back with an all-zero report.
pub async fn reap(
    config: &ReapConfig,
    reporter: Arc<dyn ProgressReporter>,
    stop: StopToken,
) -> Result<RunReport, RunAborted> {
    let aborted = |error| RunAborted {
        report: RunReport::default(),
        error,
    };
    let scan_config = config.compile().map_err(aborted)?;
    let endpoint: StoreEndpoint = match config.endpoint.parse() {
        Ok(endpoint) => endpoint,
        Err(never) => match never {},
    };
    let store = connect(&endpoint, config.client_options())
        .await
        .map_err(|e| aborted(ReapError::from_connect(&config.endpoint, e)))?;

    ClassificationPolicy::new(store, config.endpoint.clone(), scan_config, reporter)
        .with_stop_token(stop)
        .run()
        .await
}
