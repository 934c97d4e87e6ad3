//! Common fixtures for keyreap integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use keyreap::{ClassificationPolicy, CollectingReporter, ProgressReporter, ReapConfig};
use keyreap_store::{KeyStore, MemoryKeyStore};

pub const TABLE: &str = "my_big_table";

/// Store with `TABLE` holding `keys`.
pub fn seeded<S: AsRef<str>>(keys: &[S]) -> MemoryKeyStore {
    let store = MemoryKeyStore::new();
    store.create_table(TABLE).unwrap();
    for k in keys {
        store.put_key(TABLE, k.as_ref()).unwrap();
    }
    store
}

/// `matching` keys that the default delete pattern selects, `retained`
/// dated keys outside the deleted years, and `odd` keys with no date.
pub fn mixed_keys(matching: usize, retained: usize, odd: usize) -> Vec<String> {
    let mut keys = Vec::with_capacity(matching + retained + odd);
    keys.extend((0..matching).map(|i| format!("yyyymmddhh=2012{:08}", i)));
    keys.extend((0..retained).map(|i| format!("yyyymmddhh=2017{:08}", i)));
    keys.extend((0..odd).map(|i| format!("other_key_{:06}", i)));
    keys
}

pub fn config() -> ReapConfig {
    ReapConfig {
        table: TABLE.to_string(),
        ..Default::default()
    }
}

pub fn policy(
    store: Arc<dyn KeyStore>,
    config: ReapConfig,
) -> (ClassificationPolicy, Arc<CollectingReporter>) {
    let reporter = Arc::new(CollectingReporter::new());
    let policy = ClassificationPolicy::new(
        store,
        "memory:",
        config.compile().unwrap(),
        Arc::clone(&reporter) as Arc<dyn ProgressReporter>,
    );
    (policy, reporter)
}
