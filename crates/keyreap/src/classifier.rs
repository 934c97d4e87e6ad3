//! Row key classification against the delete pattern and the suspect
//! antipattern.
//!
//! Classification is a priority chain: a delete-pattern match always wins,
//! then a configured antipattern that the key fails to match marks it a
//! suspect, and everything else is safe. What happens to a suspect is the
//! policy's decision, not the classifier's.

use keyreap_store::RowKey;
use regex::bytes::Regex;

use crate::error::{ReapError, Result};

/// Outcome of classifying one row key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Key matches the delete pattern.
    ToDelete,
    /// Key matches neither the delete pattern nor the known-safe antipattern.
    Suspect,
    /// Key is retained.
    Safe,
}

/// Compiled delete pattern and optional suspect antipattern.
#[derive(Clone, Debug)]
pub struct PatternClassifier {
    delete: Option<Regex>,
    antipattern: Option<Regex>,
}

impl PatternClassifier {
    /// Compiles both patterns. An empty pattern disables its check: an empty
    /// delete pattern matches no key, an empty antipattern turns off suspect
    /// detection.
    pub fn new(delete_pattern: &str, suspect_antipattern: &str) -> Result<Self> {
        Ok(Self {
            delete: compile("delete pattern", delete_pattern)?,
            antipattern: compile("suspect antipattern", suspect_antipattern)?,
        })
    }

    /// Classifies `key`. Depends on nothing but the key and the patterns.
    pub fn classify(&self, key: &RowKey) -> Classification {
        let bytes = key.as_bytes();
        if self.delete.as_ref().is_some_and(|re| re.is_match(bytes)) {
            return Classification::ToDelete;
        }
        match &self.antipattern {
            Some(re) if !re.is_match(bytes) => Classification::Suspect,
            _ => Classification::Safe,
        }
    }

    /// The delete pattern source, `None` when empty.
    pub fn delete_pattern(&self) -> Option<&str> {
        self.delete.as_ref().map(Regex::as_str)
    }

    /// The antipattern source, `None` when suspect detection is off.
    pub fn suspect_antipattern(&self) -> Option<&str> {
        self.antipattern.as_ref().map(Regex::as_str)
    }
}

fn compile(field: &'static str, pattern: &str) -> Result<Option<Regex>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|source| ReapError::InvalidPattern {
            field,
            pattern: pattern.to_string(),
            source,
        })
}
