//! End-to-end properties of a deletion run against the in-process store.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use common::{config, mixed_keys, policy, seeded, TABLE};
use keyreap::{
    reap, CollectingReporter, DeleteErrorPolicy, ProgressEvent, ProgressReporter, ReapError,
    StopToken,
};
use keyreap_store::testing::{Fault, FaultyKeyStore};
use keyreap_store::RowKey;

#[tokio::test]
async fn test_example_pattern_only() {
    let store = seeded(&["yyyymmddhh=2010010100", "yyyymmddhh=2016010100", "other_key"]);
    let (p, _) = policy(Arc::new(store.clone()), config());
    let report = p.run().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.scanned, 3);
    assert_eq!(
        store.keys(TABLE).unwrap(),
        vec![RowKey::from("other_key"), RowKey::from("yyyymmddhh=2016010100")]
    );
}

#[tokio::test]
async fn test_example_delete_suspects() {
    let store = seeded(&["yyyymmddhh=2010010100", "yyyymmddhh=2016010100", "other_key"]);
    let mut cfg = config();
    cfg.suspect_antipattern = "^yyyymmddhh=".into();
    cfg.delete_suspects = true;
    let (p, _) = policy(Arc::new(store.clone()), cfg);
    let report = p.run().await.unwrap();
    assert_eq!(report.deleted, 2);
    assert_eq!(report.suspects, 1);
    assert!(!store.contains(TABLE, b"other_key").unwrap());
}

#[tokio::test]
async fn test_full_scan_coverage() {
    let keys = mixed_keys(1_234, 2_000, 17);
    let store = seeded(&keys);
    let mut cfg = config();
    cfg.batch_size = 100;
    cfg.suspect_antipattern = "^yyyymmddhh=".into();
    let (p, reporter) = policy(Arc::new(store.clone()), cfg);
    let report = p.run().await.unwrap();
    assert_eq!(report.scanned, keys.len() as u64);
    assert_eq!(report.deleted, 1_234);
    assert_eq!(report.suspects, 17);
    assert_eq!(reporter.suspects().len(), 17);
    assert!(reporter.suspects().iter().all(|(_, will_delete)| !will_delete));
    assert_eq!(store.row_count(TABLE).unwrap(), 2_017);
}

#[tokio::test]
async fn test_suspect_delete_mode_counts_both() {
    let keys = mixed_keys(300, 50, 25);
    let store = seeded(&keys);
    let mut cfg = config();
    cfg.suspect_antipattern = "^yyyymmddhh=".into();
    cfg.delete_suspects = true;
    let (p, _) = policy(Arc::new(store.clone()), cfg);
    let report = p.run().await.unwrap();
    assert_eq!(report.deleted, 325);
    assert_eq!(store.row_count(TABLE).unwrap(), 50);
}

#[tokio::test]
async fn test_second_run_deletes_nothing() {
    let store = seeded(&mixed_keys(40, 10, 0));
    let (first, _) = policy(Arc::new(store.clone()), config());
    assert_eq!(first.run().await.unwrap().deleted, 40);
    let (second, _) = policy(Arc::new(store.clone()), config());
    let report = second.run().await.unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(report.scanned, 10);
}

#[tokio::test]
async fn test_checkpoints_every_hundred_thousand() {
    let store = seeded(&mixed_keys(250_000, 10, 0));
    let (p, reporter) = policy(Arc::new(store), config());
    let report = p.run().await.unwrap();
    assert_eq!(report.deleted, 250_000);
    assert_eq!(reporter.checkpoints(), vec![100_000, 200_000]);
    // Both checkpoints precede the final tally.
    let events = reporter.events();
    assert!(matches!(events.last(), Some(ProgressEvent::Finished(r)) if r.deleted == 250_000));
}

#[tokio::test]
async fn test_close_runs_once_on_success() {
    let faulty = FaultyKeyStore::new(seeded(&mixed_keys(10, 10, 0)));
    let (p, _) = policy(Arc::new(faulty.clone()), config());
    p.run().await.unwrap();
    assert_eq!(faulty.scanners_opened(), 1);
    assert_eq!(faulty.close_calls(), 1);
    assert_eq!(faulty.inner().open_scanner_count(), 0);
}

#[tokio::test]
async fn test_close_runs_once_on_scan_failure_and_keeps_partial_counts() {
    let faulty = FaultyKeyStore::new(seeded(&mixed_keys(20, 0, 0)));
    faulty.fail_scan_after(7, Fault::LeaseExpired);
    let mut cfg = config();
    cfg.batch_size = 3;
    let (p, reporter) = policy(Arc::new(faulty.clone()), cfg);
    let aborted = p.run().await.unwrap_err();
    assert!(matches!(aborted.error, ReapError::Scan { .. }));
    assert_eq!(aborted.report.scanned, 7);
    assert_eq!(aborted.report.deleted, 7);
    assert_eq!(faulty.close_calls(), 1);
    assert_eq!(faulty.inner().open_scanner_count(), 0);
    // Deletes before the failure are not rolled back.
    assert_eq!(faulty.inner().row_count(TABLE).unwrap(), 13);
    assert!(matches!(reporter.events().last(), Some(ProgressEvent::Finished(r)) if r.deleted == 7));
}

#[tokio::test]
async fn test_connectivity_failure_at_open() {
    let faulty = FaultyKeyStore::new(seeded(&mixed_keys(3, 0, 0)));
    faulty.fail_open(Fault::Unreachable);
    let (p, _) = policy(Arc::new(faulty.clone()), config());
    let aborted = p.run().await.unwrap_err();
    assert!(matches!(aborted.error, ReapError::Connectivity { .. }));
    assert_eq!(aborted.report.scanned, 0);
    assert_eq!(faulty.close_calls(), 0);
    assert_eq!(faulty.delete_calls(), 0);
}

#[tokio::test]
async fn test_lost_ack_is_skipped_and_row_is_gone() {
    // The store applied the delete but the acknowledgement timed out.
    let keys = mixed_keys(5, 0, 0);
    let faulty = FaultyKeyStore::new(seeded(&keys));
    faulty.lose_ack_of(&keys[2]);
    let mut cfg = config();
    cfg.on_delete_error = DeleteErrorPolicy::Skip;
    let (p, _) = policy(Arc::new(faulty.clone()), cfg);
    let report = p.run().await.unwrap();
    assert_eq!(report.deleted, 4);
    assert_eq!(report.failed_deletes, 1);
    assert_eq!(faulty.inner().row_count(TABLE).unwrap(), 0);
}

#[tokio::test]
async fn test_reap_rejects_bad_pattern_before_contacting_store() {
    let mut cfg = config();
    cfg.endpoint = "zk1:2181".into();
    cfg.delete_pattern = "yyyymmddhh=(".into();
    let reporter: Arc<dyn ProgressReporter> = Arc::new(CollectingReporter::new());
    let aborted = reap(&cfg, reporter, StopToken::new()).await.unwrap_err();
    assert!(aborted.error.is_configuration());
    assert_eq!(aborted.report.scanned, 0);
}

#[tokio::test]
async fn test_reap_unreachable_endpoint() {
    let mut cfg = config();
    cfg.endpoint = "zk1:2181".into();
    let reporter: Arc<dyn ProgressReporter> = Arc::new(CollectingReporter::new());
    let aborted = reap(&cfg, reporter, StopToken::new()).await.unwrap_err();
    assert!(matches!(aborted.error, ReapError::Connectivity { ref endpoint, .. } if endpoint == "zk1:2181"));
}

#[tokio::test]
async fn test_reap_against_key_dump() {
    let mut file = tempfile::Builder::new()
        .prefix("events")
        .suffix(".keys")
        .tempfile()
        .unwrap();
    for key in ["yyyymmddhh=2010010100", "yyyymmddhh=2016010100", "other_key"] {
        writeln!(file, "{key}").unwrap();
    }
    let table = file
        .path()
        .file_stem()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let mut cfg = config();
    cfg.endpoint = format!("dump:{}", file.path().display());
    cfg.table = table;
    cfg.suspect_antipattern = "^yyyymmddhh=".into();
    let reporter = Arc::new(CollectingReporter::new());
    let report = reap(
        &cfg,
        Arc::clone(&reporter) as Arc<dyn ProgressReporter>,
        StopToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.deleted, 1);
    assert_eq!(reporter.suspects(), vec![(RowKey::from("other_key"), false)]);
}

#[tokio::test]
async fn test_reap_against_dump_with_wrong_table() {
    let file = tempfile::Builder::new()
        .prefix("events")
        .suffix(".keys")
        .tempfile()
        .unwrap();
    let mut cfg = config();
    cfg.endpoint = format!("dump:{}", file.path().display());
    cfg.table = "not_the_dump".into();
    let reporter: Arc<dyn ProgressReporter> = Arc::new(CollectingReporter::new());
    let aborted = reap(&cfg, reporter, StopToken::new()).await.unwrap_err();
    assert!(matches!(aborted.error, ReapError::TableNotFound(_)));
}

#[tokio::test]
async fn test_reap_against_missing_dump_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.endpoint = format!("dump:{}", dir.path().join("absent.keys").display());
    let reporter: Arc<dyn ProgressReporter> = Arc::new(CollectingReporter::new());
    let aborted = reap(&cfg, reporter, StopToken::new()).await.unwrap_err();
    assert!(aborted.error.is_configuration(), "{}", aborted.error);
    assert!(!matches!(aborted.error, ReapError::Connectivity { .. }));
    assert_eq!(aborted.report.scanned, 0);
}

#[tokio::test]
async fn test_reap_against_dump_with_binary_keys() {
    let mut file = tempfile::Builder::new()
        .prefix("binary")
        .suffix(".keys")
        .tempfile()
        .unwrap();
    file.write_all(b"yyyymmddhh=2013\xff01\nyyyymmddhh=2013010100\nkeep\xfe\n")
        .unwrap();
    let mut cfg = config();
    cfg.endpoint = format!("dump:{}", file.path().display());
    cfg.table = file.path().file_stem().unwrap().to_str().unwrap().to_string();
    cfg.delete_pattern = "^yyyymmddhh=2013".into();
    let reporter: Arc<dyn ProgressReporter> = Arc::new(CollectingReporter::new());
    let report = reap(&cfg, reporter, StopToken::new()).await.unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.deleted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_run() {
    let store = seeded(&mixed_keys(50, 0, 0));
    let mut cfg = config();
    cfg.max_deletes_per_sec = 10;
    let (p, _) = policy(Arc::new(store), cfg);
    let start = tokio::time::Instant::now();
    let report = p.run().await.unwrap();
    assert_eq!(report.deleted, 50);
    // 10 ride the initial burst, the other 40 take four seconds.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(3_900), "elapsed {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(4_100), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_sharded_run_matches_sequential_run() {
    let keys = mixed_keys(500, 300, 40);
    let mut cfg = config();
    cfg.suspect_antipattern = "^yyyymmddhh=".into();

    let sequential_store = seeded(&keys);
    let (p, _) = policy(Arc::new(sequential_store.clone()), cfg.clone());
    let sequential = p.run().await.unwrap();

    let sharded_store = seeded(&keys);
    cfg.split_keys = vec!["yyyymmddhh=2012".into(), "yyyymmddhh=2017".into()];
    let (p, _) = policy(Arc::new(sharded_store.clone()), cfg);
    let sharded = p.run().await.unwrap();

    assert_eq!(sharded.shards, 3);
    assert_eq!(sharded.scanned, sequential.scanned);
    assert_eq!(sharded.deleted, sequential.deleted);
    assert_eq!(sharded.suspects, sequential.suspects);
    assert_eq!(
        sharded_store.keys(TABLE).unwrap(),
        sequential_store.keys(TABLE).unwrap()
    );
}
