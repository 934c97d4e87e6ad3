//! Error types for a deletion run

use keyreap_store::{RowKey, StoreError};
use thiserror::Error;

use crate::cancel::StopReason;
use crate::report::RunReport;

/// All errors that can end a deletion run or fail a single row.
#[derive(Debug, Error)]
pub enum ReapError {
    /// Invalid operator input, detected before any row is scanned
    #[error("configuration error: {reason}")]
    Configuration {
        /// What was wrong
        reason: String,
    },
    /// A pattern failed to compile
    #[error("invalid {field} {pattern:?}: {source}")]
    InvalidPattern {
        /// Which option held the pattern
        field: &'static str,
        /// The pattern as given
        pattern: String,
        /// Compiler diagnostic
        #[source]
        source: regex::Error,
    },
    /// The target table does not exist
    #[error("configuration error: table '{0}' not found")]
    TableNotFound(String),
    /// The store could not be reached or refused the session
    #[error("cannot connect to store at {endpoint}: {source}")]
    Connectivity {
        /// Store endpoint
        endpoint: String,
        /// Underlying client error
        #[source]
        source: StoreError,
    },
    /// The scan failed mid-run (lease expiry, timeout, server error)
    #[error("scan of table '{table}' failed: {source}")]
    Scan {
        /// Scanned table
        table: String,
        /// Underlying client error
        #[source]
        source: StoreError,
    },
    /// A single-row delete failed
    #[error("delete of row {key} failed: {source}")]
    Delete {
        /// Row that was not confirmed deleted
        key: RowKey,
        /// Underlying client error
        #[source]
        source: StoreError,
    },
    /// The run was asked to stop before the scan was exhausted
    #[error("run stopped: {0}")]
    Stopped(StopReason),
    /// A shard task panicked or was aborted
    #[error("shard task failed: {0}")]
    TaskFailed(String),
}

impl ReapError {
    /// Maps a failure to open a scanner onto the run taxonomy.
    pub fn from_open(endpoint: &str, table: &str, err: StoreError) -> Self {
        match err {
            StoreError::TableNotFound(t) => ReapError::TableNotFound(t),
            StoreError::InvalidFilter { reason } => ReapError::Configuration {
                reason: format!("store rejected pushed-down filter: {reason}"),
            },
            e if e.is_connectivity() => ReapError::Connectivity {
                endpoint: endpoint.to_string(),
                source: e,
            },
            e => ReapError::Scan {
                table: table.to_string(),
                source: e,
            },
        }
    }

    /// Maps a failure to establish the store session. A dump endpoint that
    /// cannot be read is an operator error, not a connectivity one.
    pub fn from_connect(endpoint: &str, err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => ReapError::Configuration {
                reason: format!("cannot load store endpoint {endpoint}: {e}"),
            },
            e => ReapError::Connectivity {
                endpoint: endpoint.to_string(),
                source: e,
            },
        }
    }

    /// Returns true for errors raised before the store was contacted or
    /// while opening the scan.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ReapError::Configuration { .. }
                | ReapError::InvalidPattern { .. }
                | ReapError::TableNotFound(_)
        )
    }
}

/// A fatal run failure, carrying the counters accumulated up to the failure.
#[derive(Debug, Error)]
#[error("run aborted ({report}): {error}")]
pub struct RunAborted {
    /// Partial tally at the time of failure.
    pub report: RunReport,
    /// What ended the run.
    #[source]
    pub error: ReapError,
}

pub type Result<T> = std::result::Result<T, ReapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_mapping() {
        let e = ReapError::from_open("zk:2181", "t", StoreError::TableNotFound("t".into()));
        assert!(matches!(e, ReapError::TableNotFound(ref t) if t == "t"));
        assert!(e.is_configuration());

        let e = ReapError::from_open(
            "zk:2181",
            "t",
            StoreError::Unreachable {
                endpoint: "zk:2181".into(),
                reason: "refused".into(),
            },
        );
        assert!(matches!(e, ReapError::Connectivity { .. }));

        let e = ReapError::from_open("zk:2181", "t", StoreError::LeaseExpired { lease_ms: 1 });
        assert!(matches!(e, ReapError::Scan { .. }));
        assert!(!e.is_configuration());

        let e = ReapError::from_open(
            "zk:2181",
            "t",
            StoreError::InvalidFilter {
                reason: "bad".into(),
            },
        );
        assert!(e.is_configuration());
    }

    #[test]
    fn test_connect_error_mapping() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let e = ReapError::from_connect("dump:/tmp/keys.txt", StoreError::Io(missing));
        assert!(e.is_configuration());
        assert!(e.to_string().contains("dump:/tmp/keys.txt"));

        let e = ReapError::from_connect(
            "zk:2181",
            StoreError::Unreachable {
                endpoint: "zk:2181".into(),
                reason: "refused".into(),
            },
        );
        assert!(matches!(e, ReapError::Connectivity { ref endpoint, .. } if endpoint == "zk:2181"));
    }

    #[test]
    fn test_delete_error_names_the_key() {
        let e = ReapError::Delete {
            key: RowKey::from("row-7"),
            source: StoreError::Timeout { timeout_ms: 50 },
        };
        assert_eq!(
            e.to_string(),
            "delete of row row-7 failed: rpc timed out after 50ms"
        );
    }
}
