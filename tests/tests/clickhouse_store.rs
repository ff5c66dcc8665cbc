//! ClickHouse stat store against a real server.
//!
//! Requires Docker (or `BOXSTATS_TEST_CLICKHOUSE_URL`). Run with
//! `cargo test -p integration-tests --test clickhouse_store -- --ignored`.

use chrono::Duration;
use integration_tests::containers::TestContainers;
use integration_tests::fixtures::{at, complete_minute};
use stat_store::{health::init_schema, ClickHouseClient, ClickHouseStatStore, StatQuery, StatStore};
use stats_core::{Bucket, Measure, StatRecord, VELOCITY_MEASURES};

async fn store(containers: &TestContainers, table: &str) -> ClickHouseStatStore {
    let client = ClickHouseClient::new(containers.store_config(table))
        .expect("Failed to create ClickHouse client");
    init_schema(&client).await.expect("Failed to initialize schema");
    client
        .inner()
        .query(&format!("TRUNCATE TABLE IF EXISTS {}", table))
        .execute()
        .await
        .expect("Failed to truncate");
    ClickHouseStatStore::new(client)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_conflict_and_reads() {
    let containers = TestContainers::start().await;
    let store = store(&containers, "stats_insert").await;

    let minute = at(10, 17, 0);
    let record = StatRecord::new(Measure::Upload, 5.0, Bucket::minute(minute));
    store.insert(&record).await.expect("first insert");

    let dup = StatRecord::new(Measure::Upload, 9.0, Bucket::minute(minute));
    let err = store.insert(&dup).await.unwrap_err();
    assert!(err.is_conflict());

    let history = store
        .history(&StatQuery::new(Measure::Upload))
        .await
        .unwrap();
    assert_eq!(history, vec![record]);
    assert_eq!(store.count(Measure::Upload).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_coverage_and_oldest() {
    let containers = TestContainers::start().await;
    let store = store(&containers, "stats_coverage").await;

    assert_eq!(store.oldest_starting(&VELOCITY_MEASURES).await.unwrap(), None);

    for record in complete_minute(at(10, 0, 0)) {
        store.insert(&record).await.unwrap();
    }
    for record in complete_minute(at(10, 1, 0)).into_iter().take(3) {
        store.insert(&record).await.unwrap();
    }

    assert_eq!(
        store.oldest_starting(&VELOCITY_MEASURES).await.unwrap(),
        Some(at(10, 0, 0))
    );

    let coverage = store
        .coverage(&VELOCITY_MEASURES, at(10, 0, 0), at(10, 0, 0) + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(coverage.get(&at(10, 0, 0)), Some(&7));
    assert_eq!(coverage.get(&at(10, 1, 0)), Some(&3));
    assert_eq!(coverage.get(&at(10, 2, 0)), None);
}
