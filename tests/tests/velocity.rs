//! End-to-end tests for the velocity collector against the scripted source.

use integration_tests::fixtures::{at, event, events_in_minute};
use integration_tests::setup::TestContext;
use stats_core::{Bucket, Measure, SourceError, VELOCITY_MEASURES};
use worker::BackfillConfig;

/// Collecting the last completed minute writes all seven counters.
#[tokio::test]
async fn test_records_last_completed_minute() {
    let ctx = TestContext::new(at(12, 5, 30));
    let minute = at(12, 4, 0);

    ctx.source.push_events(events_in_minute("UPLOAD", minute, 4, 2));
    ctx.source.push_events(events_in_minute("LOGIN", minute, 3, 3));
    ctx.source.push_events(vec![
        event("DOWNLOAD", "user-9", at(12, 4, 59)),
        // Outside the window on both sides
        event("UPLOAD", "user-7", at(12, 3, 59)),
        event("UPLOAD", "user-8", at(12, 5, 0)),
        // Not a watched type
        event("PREVIEW", "user-6", at(12, 4, 10)),
    ]);

    let report = ctx.velocity.record_velocity(None).await;

    assert_eq!(report.window, Bucket::minute(minute));
    assert_eq!(report.events, 8);
    assert_eq!(report.writes.recorded, VELOCITY_MEASURES.len());
    assert!(report.source_error.is_none());

    let value = |m: Measure| ctx.store.get(m, minute).map(|r| r.value);
    assert_eq!(value(Measure::Upload), Some(4.0));
    assert_eq!(value(Measure::Login), Some(3.0));
    assert_eq!(value(Measure::Download), Some(1.0));
    assert_eq!(value(Measure::Delete), Some(0.0));
    assert_eq!(value(Measure::CollaborationInvite), Some(0.0));
    assert_eq!(value(Measure::CollaborationAccept), Some(0.0));
    // user-0..2 plus user-9
    assert_eq!(value(Measure::UniqueUsers), Some(4.0));

    let record = ctx.store.get(Measure::Upload, minute).unwrap();
    assert_eq!(record.ending - record.starting, chrono::Duration::minutes(1));
}

/// A second run for the same minute conflicts on every row and changes nothing.
#[tokio::test]
async fn test_rerun_is_idempotent() {
    let ctx = TestContext::new(at(12, 5, 30));
    let minute = at(12, 4, 0);
    ctx.source.push_events(events_in_minute("DELETE", minute, 2, 1));

    let first = ctx.velocity.record_velocity(Some(minute)).await;
    assert_eq!(first.writes.recorded, 7);
    let before = ctx.store.records();

    // New events appearing later must not overwrite the stored counts.
    ctx.source.push_events(events_in_minute("DELETE", minute, 5, 1));
    let second = ctx.velocity.record_velocity(Some(minute)).await;

    assert_eq!(second.writes.recorded, 0);
    assert_eq!(second.writes.conflicts, 7);
    assert_eq!(ctx.store.records(), before);
    assert_eq!(ctx.store.get(Measure::Delete, minute).unwrap().value, 2.0);
}

/// `K * page_size + r` events take `K + 1` page requests.
#[tokio::test]
async fn test_paginates_until_short_page() {
    let ctx = TestContext::with_options(at(9, 0, 30), BackfillConfig::default(), Some(5));
    let minute = at(8, 59, 0);
    ctx.source.push_events(events_in_minute("UPLOAD", minute, 13, 13));

    let report = ctx.velocity.record_velocity(None).await;

    assert_eq!(report.events, 13);
    let calls = ctx.source.event_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(
        calls.iter().map(|q| q.stream_position.as_str()).collect::<Vec<_>>(),
        vec!["0", "5", "10"]
    );
    assert!(calls.iter().all(|q| q.limit == 5));
    assert_eq!(ctx.store.get(Measure::Upload, minute).unwrap().value, 13.0);
    assert_eq!(ctx.store.get(Measure::UniqueUsers, minute).unwrap().value, 13.0);
}

/// An exact multiple of the page size ends on an empty page.
#[tokio::test]
async fn test_exact_page_multiple_fetches_empty_tail() {
    let ctx = TestContext::with_options(at(9, 0, 30), BackfillConfig::default(), Some(5));
    let minute = at(8, 59, 0);
    ctx.source.push_events(events_in_minute("LOGIN", minute, 10, 2));

    let report = ctx.velocity.record_velocity(None).await;

    assert_eq!(report.events, 10);
    assert_eq!(ctx.source.event_calls().len(), 3);
    assert_eq!(ctx.store.get(Measure::Login, minute).unwrap().value, 10.0);
}

/// The query asks for exactly the watched types over the one-minute window.
#[tokio::test]
async fn test_query_shape() {
    let ctx = TestContext::new(at(0, 0, 10));
    ctx.velocity.record_velocity(None).await;

    let calls = ctx.source.event_calls();
    assert_eq!(calls.len(), 1);
    let query = &calls[0];
    assert_eq!(query.created_before - query.created_after, chrono::Duration::minutes(1));
    assert_eq!(
        query.event_types,
        vec![
            "UPLOAD",
            "DOWNLOAD",
            "DELETE",
            "COLLABORATION_INVITE",
            "COLLABORATION_ACCEPT",
            "LOGIN"
        ]
    );
}

/// A source that always fails still yields seven zero rows.
#[tokio::test]
async fn test_failing_source_records_zeros() {
    let ctx = TestContext::new(at(12, 5, 30));
    let minute = at(12, 4, 0);
    ctx.source.push_events(events_in_minute("UPLOAD", minute, 4, 2));
    ctx.source
        .fail_with(SourceError::Transport("connection reset".to_string()));

    let report = ctx.velocity.record_velocity(None).await;

    assert!(matches!(report.source_error, Some(SourceError::Transport(_))));
    assert!(!report.skipped);
    assert_eq!(report.writes.recorded, 7);
    for measure in VELOCITY_MEASURES {
        assert_eq!(ctx.store.get(measure, minute).unwrap().value, 0.0);
    }
}

/// A failure on a later page discards the partial fetch.
#[tokio::test]
async fn test_mid_pagination_failure_records_zeros() {
    let ctx = TestContext::with_options(at(9, 0, 30), BackfillConfig::default(), Some(5));
    let minute = at(8, 59, 0);
    ctx.source.push_events(events_in_minute("UPLOAD", minute, 12, 3));

    // First page succeeds, the second is rejected.
    ctx.source
        .fail_event_call(1, SourceError::Unauthorized("expired".to_string()));

    let report = ctx.velocity.record_velocity(None).await;

    assert!(matches!(report.source_error, Some(SourceError::Unauthorized(_))));
    assert_eq!(ctx.source.event_calls().len(), 2);
    assert_eq!(report.events, 0);
    assert_eq!(ctx.store.get(Measure::Upload, minute).unwrap().value, 0.0);
}

/// Without credentials the minute is skipped, leaving it to backfill.
#[tokio::test]
async fn test_not_configured_skips_window() {
    let ctx = TestContext::new(at(12, 5, 30));
    ctx.source
        .fail_with(SourceError::NotConfigured("no token".to_string()));

    let report = ctx.velocity.record_velocity(None).await;

    assert!(report.skipped);
    assert_eq!(report.writes.recorded, 0);
    assert!(ctx.store.is_empty());
}

/// A store that rejects writes is reported, not raised.
#[tokio::test]
async fn test_store_failures_are_isolated() {
    let ctx = TestContext::new(at(12, 5, 30));
    ctx.store.set_fail_writes(true);

    let report = ctx.velocity.record_velocity(None).await;

    assert_eq!(report.writes.failed, 7);
    assert!(ctx.store.is_empty());

    ctx.store.set_fail_writes(false);
    let retry = ctx.velocity.record_velocity(None).await;
    assert_eq!(retry.writes.recorded, 7);
}
