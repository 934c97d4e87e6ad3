//! Store client error types.

use thiserror::Error;

/// Errors surfaced by a store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unreachable at {endpoint}: {reason}")]
    Unreachable {
        /// Endpoint that was dialled.
        endpoint: String,
        /// Why the connection failed.
        reason: String,
    },

    /// The store rejected our credentials.
    #[error("authentication to {endpoint} failed")]
    AuthenticationFailed {
        /// Endpoint that refused the session.
        endpoint: String,
    },

    /// The requested table does not exist.
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// The server could not compile a pushed-down key filter.
    #[error("invalid key filter: {reason}")]
    InvalidFilter {
        /// Compiler message.
        reason: String,
    },

    /// The scanner sat idle longer than its lease.
    #[error("scanner lease expired after {lease_ms}ms")]
    LeaseExpired {
        /// Lease length in milliseconds.
        lease_ms: u64,
    },

    /// An RPC did not complete in time.
    #[error("rpc timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// An established session dropped.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// What the transport reported.
        reason: String,
    },

    /// The scanner was used after close.
    #[error("scanner already closed")]
    ScannerClosed,

    /// Any other server-side failure.
    #[error("server error: {0}")]
    Server(String),

    /// Local I/O failure, e.g. reading a key dump.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true for failures reaching or authenticating to the store,
    /// as opposed to failures of an operation on an established session.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StoreError::Unreachable { .. } | StoreError::AuthenticationFailed { .. }
        )
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
