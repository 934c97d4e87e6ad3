//! Store endpoint parsing and connection bootstrap.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::client::{ClientOptions, KeyStore};
use crate::error::{Result, StoreError};
use crate::memory::MemoryKeyStore;

/// Where the store lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEndpoint {
    /// Empty in-process store.
    Memory,
    /// In-process store seeded from a newline-delimited key dump. The
    /// table is named after the file stem.
    Dump(PathBuf),
    /// A network endpoint (`host:port` of the store's coordination
    /// service). No network client is linked into this build.
    Remote(String),
}

impl FromStr for StoreEndpoint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s == "memory" || s == "memory:" {
            return Ok(StoreEndpoint::Memory);
        }
        if let Some(path) = s.strip_prefix("dump:") {
            return Ok(StoreEndpoint::Dump(PathBuf::from(path)));
        }
        Ok(StoreEndpoint::Remote(s.to_string()))
    }
}

impl fmt::Display for StoreEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreEndpoint::Memory => write!(f, "memory:"),
            StoreEndpoint::Dump(path) => write!(f, "dump:{}", path.display()),
            StoreEndpoint::Remote(addr) => write!(f, "{}", addr),
        }
    }
}

/// Connects to the store behind `endpoint`.
pub async fn connect(endpoint: &StoreEndpoint, options: ClientOptions) -> Result<Arc<dyn KeyStore>> {
    match endpoint {
        StoreEndpoint::Memory => Ok(Arc::new(MemoryKeyStore::with_options(options))),
        StoreEndpoint::Dump(path) => {
            let store = load_dump(path, options).await?;
            Ok(Arc::new(store))
        }
        StoreEndpoint::Remote(addr) => Err(StoreError::Unreachable {
            endpoint: addr.clone(),
            reason: "no network client available for this endpoint".to_string(),
        }),
    }
}

/// Loads a key dump (one key per line) into a fresh in-process store.
///
/// Keys are raw bytes; a trailing `\r` is stripped and blank lines are
/// skipped.
pub async fn load_dump(path: &Path, options: ClientOptions) -> Result<MemoryKeyStore> {
    let table = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("dump path {} has no usable file name", path.display()),
            )
        })?;
    let contents = tokio::fs::read(path).await?;

    let store = MemoryKeyStore::with_options(options);
    store.create_table(table)?;
    let mut loaded = 0usize;
    for line in contents.split(|b| *b == b'\n') {
        let key = line.strip_suffix(b"\r").unwrap_or(line);
        if key.is_empty() {
            continue;
        }
        store.put_key(table, key)?;
        loaded += 1;
    }
    info!(table, rows = loaded, path = %path.display(), "loaded key dump");
    Ok(store)
}
