#![warn(missing_docs)]

//! keyreap store layer: the sorted key-value client interface used by the
//! deletion core, plus in-process implementations.
//!
//! The real store (storage engine, replication, filter execution, region
//! management) lives behind [`KeyStore`]. [`MemoryKeyStore`] implements the
//! same contract in memory for rehearsals and tests.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod memory;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use client::{
    ClientOptions, KeyFilter, KeyStore, ScanRequest, Scanner, StoreCapabilities,
};
pub use endpoint::{connect, StoreEndpoint};
pub use error::{Result, StoreError};
pub use memory::MemoryKeyStore;
pub use types::{Cell, KeyRange, Row, RowKey};
