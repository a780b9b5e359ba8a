//! Contract Test: Record Pool Synchronizer
//!
//! Constraints verified:
//! - Adding a value twice creates exactly one record
//! - A bucket never exceeds capacity after a pass
//! - Eviction removes the record with the smallest creation timestamp
//! - Listings are complete across pages and always terminate
//! - A missing store makes zero remote calls
//! - One failing value does not stop the others
//!
//! If this test fails, the record pool can overflow the provider plan.

mod common;

use common::*;
use dnspool_core::config::{RoutingLine, SyncConfig};
use dnspool_core::error::ErrorKind;
use dnspool_core::store::MemoryRecordStore;
use dnspool_core::sync::{RecordPoolSynchronizer, SyncOutcome, SyncStage};
use dnspool_core::traits::ListQuery;
use std::sync::Arc;

const DOMAIN: &str = "example.com";

fn synchronizer(store: &Arc<RecordingStore>, config: SyncConfig) -> RecordPoolSynchronizer {
    RecordPoolSynchronizer::new(Some(store.clone()), DOMAIN, config)
}

fn bucket_values(records: &[dnspool_core::DnsRecord], line: &str) -> Vec<String> {
    let mut values: Vec<String> = records
        .iter()
        .filter(|r| r.host_record == "cf" && r.line == line)
        .map(|r| r.value.clone())
        .collect();
    values.sort();
    values
}

#[tokio::test]
async fn end_to_end_eviction_scenario() {
    let seeded = MemoryRecordStore::with_records(
        DOMAIN,
        vec![
            record("1", "cf", "1.1.1.1", "mobile", Some(1_000)),
            record("2", "cf", "2.2.2.2", "mobile", Some(2_000)),
        ],
    );
    let store = Arc::new(RecordingStore::new(seeded));
    let sync = synchronizer(&store, sync_config(2));

    let outcome = sync.add_value("cf", RoutingLine::Mobile, "3.3.3.3").await;

    match outcome {
        SyncOutcome::Created { evicted, .. } => {
            assert_eq!(evicted.len(), 1);
            assert_eq!(evicted[0].record_id, "1");
        }
        other => panic!("expected a created record, got {:?}", other),
    }

    // delete of the oldest strictly precedes the create
    assert_eq!(
        store.writes(),
        vec![
            StoreCall::Delete { record_id: "1".to_string() },
            StoreCall::Create {
                value: "3.3.3.3".to_string(),
                line: RoutingLine::Mobile,
            },
        ]
    );

    let records = store.memory().records(DOMAIN).await;
    assert_eq!(bucket_values(&records, "mobile"), vec!["2.2.2.2", "3.3.3.3"]);
}

#[tokio::test]
async fn adding_twice_creates_once() {
    let store = Arc::new(RecordingStore::new(MemoryRecordStore::new()));
    let sync = synchronizer(&store, sync_config(100));

    let first = sync.add_value("cf", RoutingLine::Telecom, "1.1.1.1").await;
    let second = sync.add_value("cf", RoutingLine::Telecom, "1.1.1.1").await;

    assert!(matches!(first, SyncOutcome::Created { .. }));
    assert_eq!(second, SyncOutcome::AlreadyPresent);
    assert_eq!(store.memory().len(DOMAIN).await, 1);
    assert_eq!(
        store
            .writes()
            .iter()
            .filter(|c| matches!(c, StoreCall::Create { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn same_value_on_other_line_is_a_new_record() {
    let store = Arc::new(RecordingStore::new(MemoryRecordStore::new()));
    let sync = synchronizer(&store, sync_config(100));

    sync.add_value("cf", RoutingLine::Telecom, "1.1.1.1").await;
    let other_line = sync.add_value("cf", RoutingLine::Unicom, "1.1.1.1").await;

    assert!(matches!(other_line, SyncOutcome::Created { .. }));
    assert_eq!(store.memory().len(DOMAIN).await, 2);
}

#[tokio::test]
async fn bucket_never_exceeds_capacity() {
    let store = Arc::new(RecordingStore::new(MemoryRecordStore::new()));
    let sync = synchronizer(&store, sync_config(3));

    let values = candidates(10);
    let report = sync.sync_line("cf", RoutingLine::Mobile, &values).await;

    assert_eq!(report.created, 10);
    assert_eq!(report.evicted, 7);

    let records = store.memory().records(DOMAIN).await;
    // the three newest survive
    assert_eq!(
        bucket_values(&records, "mobile"),
        vec!["10.0.0.10", "10.0.0.8", "10.0.0.9"]
    );
}

#[tokio::test]
async fn capacity_is_per_line_and_per_host() {
    let seeded = MemoryRecordStore::with_records(
        DOMAIN,
        vec![
            record("1", "cf", "1.1.1.1", "unicom", Some(1)),
            record("2", "cf-api", "2.2.2.2", "mobile", Some(2)),
            record("3", "cf", "3.3.3.3", "mobile", Some(3)),
        ],
    );
    let store = Arc::new(RecordingStore::new(seeded));
    let sync = synchronizer(&store, sync_config(1));

    let outcome = sync.add_value("cf", RoutingLine::Mobile, "4.4.4.4").await;

    // only the cf/mobile record is eligible, even though others are older
    match outcome {
        SyncOutcome::Created { evicted, .. } => {
            assert_eq!(evicted.len(), 1);
            assert_eq!(evicted[0].record_id, "3");
        }
        other => panic!("expected a created record, got {:?}", other),
    }
}

#[tokio::test]
async fn eviction_prefers_missing_timestamp_then_first_on_ties() {
    let seeded = MemoryRecordStore::with_records(
        DOMAIN,
        vec![
            record("1", "cf", "1.1.1.1", "mobile", Some(5)),
            record("2", "cf", "2.2.2.2", "mobile", None),
            record("3", "cf", "3.3.3.3", "mobile", Some(5)),
        ],
    );
    let store = Arc::new(RecordingStore::new(seeded));
    let sync = synchronizer(&store, sync_config(3));

    sync.add_value("cf", RoutingLine::Mobile, "4.4.4.4").await;
    sync.add_value("cf", RoutingLine::Mobile, "5.5.5.5").await;

    let deleted: Vec<StoreCall> = store
        .writes()
        .into_iter()
        .filter(|c| matches!(c, StoreCall::Delete { .. }))
        .collect();
    assert_eq!(
        deleted,
        vec![
            StoreCall::Delete { record_id: "2".to_string() },
            StoreCall::Delete { record_id: "1".to_string() },
        ]
    );
}

#[tokio::test]
async fn over_capacity_bucket_is_brought_back_under() {
    let seeded = MemoryRecordStore::with_records(
        DOMAIN,
        (1..=5)
            .map(|i| record(&i.to_string(), "cf", &format!("1.1.1.{}", i), "mobile", Some(i)))
            .collect(),
    );
    let store = Arc::new(RecordingStore::new(seeded));
    let sync = synchronizer(&store, sync_config(3));

    let outcome = sync.add_value("cf", RoutingLine::Mobile, "9.9.9.9").await;

    match outcome {
        SyncOutcome::Created { evicted, .. } => {
            let ids: Vec<&str> = evicted.iter().map(|r| r.record_id.as_str()).collect();
            assert_eq!(ids, vec!["1", "2", "3"]);
        }
        other => panic!("expected a created record, got {:?}", other),
    }
    assert_eq!(store.memory().len(DOMAIN).await, 3);
}

#[tokio::test]
async fn listing_spans_pages_for_capacity_decisions() {
    // capacity + 1 records over several pages of two
    let seeded = MemoryRecordStore::with_records(
        DOMAIN,
        (1..=6)
            .map(|i| record(&i.to_string(), "cf", &format!("1.1.1.{}", i), "mobile", Some(100 - i)))
            .collect(),
    );
    let store = Arc::new(RecordingStore::new(seeded));
    let config = SyncConfig {
        capacity: 5,
        page_size: 2,
        ..SyncConfig::default()
    };
    let sync = synchronizer(&store, config);

    let listed = sync.list_bucket("cf", RoutingLine::Mobile).await.unwrap();
    assert_eq!(listed.len(), 6);

    let outcome = sync.add_value("cf", RoutingLine::Mobile, "9.9.9.9").await;
    match outcome {
        SyncOutcome::Created { evicted, .. } => {
            // the oldest record sits on the last page
            let ids: Vec<&str> = evicted.iter().map(|r| r.record_id.as_str()).collect();
            assert_eq!(ids, vec!["6", "5"]);
        }
        other => panic!("expected a created record, got {:?}", other),
    }
    assert_eq!(store.memory().len(DOMAIN).await, 5);
}

#[tokio::test]
async fn keyword_matches_are_filtered_exactly() {
    let seeded = MemoryRecordStore::with_records(
        DOMAIN,
        vec![
            record("1", "cf-api", "1.1.1.1", "mobile", Some(1)),
            record("2", "cf", "2.2.2.2", "mobile", Some(2)),
        ],
    );
    let store = Arc::new(RecordingStore::new(seeded));
    let sync = synchronizer(&store, sync_config(100));

    let all = sync
        .list_all(ListQuery::new(DOMAIN, 1, 500).with_host_record("cf"))
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].record_id, "2");

    // cf-api holds 1.1.1.1, cf does not
    let outcome = sync.add_value("cf", RoutingLine::Mobile, "1.1.1.1").await;
    assert!(matches!(outcome, SyncOutcome::Created { .. }));
}

#[tokio::test]
async fn always_full_pages_terminate() {
    let store = Arc::new(EndlessStore::new());
    let config = SyncConfig {
        page_size: 2,
        max_pages: 4,
        ..SyncConfig::default()
    };
    let sync = RecordPoolSynchronizer::new(Some(store.clone()), DOMAIN, config);

    let listed = sync.list_bucket("cf", RoutingLine::Mobile).await.unwrap();
    assert_eq!(listed.len(), 8);
    assert_eq!(store.list_calls(), 4);

    let outcome = sync.add_value("cf", RoutingLine::Mobile, "9.9.9.9").await;
    assert!(matches!(outcome, SyncOutcome::Created { .. }));
    assert_eq!(store.create_calls(), 1);
}

#[tokio::test]
async fn missing_store_makes_no_remote_calls() {
    let sync = RecordPoolSynchronizer::new(None, DOMAIN, SyncConfig::default());

    let report = sync
        .sync_line("cf", RoutingLine::Mobile, &candidates(3))
        .await;

    assert_eq!(report.attempted, 3);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.created, 0);
    assert_eq!(report.failed(), 0);
}

#[tokio::test]
async fn create_failure_does_not_stop_later_values() {
    let store = Arc::new(RecordingStore::new(MemoryRecordStore::new()).failing_create("10.0.0.2"));
    let sync = synchronizer(&store, sync_config(100));

    let report = sync.sync_line("cf", RoutingLine::Unicom, &candidates(3)).await;

    assert_eq!(report.created, 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].stage, SyncStage::Creation);
    assert_eq!(report.failures[0].kind, ErrorKind::Provider);
    assert_eq!(
        bucket_values(&store.memory().records(DOMAIN).await, "unicom"),
        vec!["10.0.0.1", "10.0.0.3"]
    );
}

#[tokio::test]
async fn failed_eviction_abandons_insert() {
    let seeded = MemoryRecordStore::with_records(
        DOMAIN,
        vec![record("1", "cf", "1.1.1.1", "mobile", Some(1))],
    );
    let store = Arc::new(RecordingStore::new(seeded).failing_delete());
    let sync = synchronizer(&store, sync_config(1));

    let outcome = sync.add_value("cf", RoutingLine::Mobile, "2.2.2.2").await;

    match outcome {
        SyncOutcome::Failed(failure) => assert_eq!(failure.stage, SyncStage::Eviction),
        other => panic!("expected an eviction failure, got {:?}", other),
    }
    assert!(
        !store
            .writes()
            .iter()
            .any(|c| matches!(c, StoreCall::Create { .. }))
    );
    assert_eq!(store.memory().len(DOMAIN).await, 1);
}

#[tokio::test]
async fn listing_failure_is_contained() {
    let store = Arc::new(RecordingStore::new(MemoryRecordStore::new()).failing_list());
    let sync = synchronizer(&store, sync_config(100));

    let report = sync.sync_line("cf", RoutingLine::Mobile, &candidates(2)).await;

    assert_eq!(report.failed(), 2);
    assert!(report.failures.iter().all(|f| f.stage == SyncStage::Lookup));
    assert!(store.writes().is_empty());
}
