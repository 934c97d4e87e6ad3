//! Row, key and range types shared by the store and the deletion core.

use std::fmt;

use bytes::Bytes;

/// Row key: the store's natural, totally ordered sort key.
///
/// Backed by [`Bytes`] so keys handed from a scanner batch to the
/// classifier and then to a delete never copy the underlying buffer.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(Bytes);

impl RowKey {
    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for RowKey {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for RowKey {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Vec<u8>> for RowKey {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&[u8]> for RowKey {
    fn from(v: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(v))
    }
}

impl AsRef<[u8]> for RowKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// A single cell of a row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    /// Column family.
    pub family: Bytes,
    /// Column qualifier.
    pub qualifier: Bytes,
    /// Cell value. Empty when the scan asked for a key-only projection.
    pub value: Bytes,
}

/// A scanned row: its key plus whatever cells the projection kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    /// Row key.
    pub key: RowKey,
    /// Cells returned by the store.
    pub cells: Vec<Cell>,
}

/// Half-open key range `[start, end)`. `None` bounds are unbounded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub start: Option<RowKey>,
    /// Exclusive upper bound.
    pub end: Option<RowKey>,
}

impl KeyRange {
    /// The whole key space.
    pub fn full() -> Self {
        Self::default()
    }

    /// Range between two optional bounds.
    pub fn new(start: Option<RowKey>, end: Option<RowKey>) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start.as_ref().map(|k| k.to_string());
        let end = self.end.as_ref().map(|k| k.to_string());
        write!(
            f,
            "[{}, {})",
            start.as_deref().unwrap_or("-inf"),
            end.as_deref().unwrap_or("+inf")
        )
    }
}
