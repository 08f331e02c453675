//! End-to-end pull, write and subscription flows.

use lexisync_protocol::{ChannelName, Checkpoint, EntityKind, FailureCode};
use lexisync_server::ServerError;
use lexisync_store::{RecordWrite, WordEvent};
use lexisync_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn replay_with_same_checkpoint_is_idempotent() {
    let stack = TestStack::new();
    for id in ["b", "a", "c", "d"] {
        stack
            .server
            .write("7", EntityKind::Cards, RecordWrite::new(id, json!({})))
            .await
            .unwrap();
    }

    let first = stack.pull(EntityKind::Cards, "7", None, 2).await;
    let cp = first.checkpoint.clone();
    let again = stack.pull(EntityKind::Cards, "7", cp.as_ref(), 2).await;
    let replay = stack.pull(EntityKind::Cards, "7", cp.as_ref(), 2).await;
    assert_eq!(again, replay);
    assert_eq!(first.records.len() + again.records.len(), 4);
}

#[tokio::test]
async fn tombstones_reach_clients() {
    let stack = TestStack::new();
    let mut replica = Replica::new();
    stack
        .server
        .write("7", EntityKind::WordLists, RecordWrite::new("l1", json!({"name": "hsk1"})))
        .await
        .unwrap();
    replica.sync(&stack, EntityKind::WordLists, "7", 10).await;
    assert_eq!(replica.live_ids(), vec!["l1"]);

    stack.tick(1.0);
    stack
        .server
        .write("7", EntityKind::WordLists, RecordWrite::delete("l1"))
        .await
        .unwrap();
    replica.sync(&stack, EntityKind::WordLists, "7", 10).await;
    assert!(replica.live_ids().is_empty());
    assert!(replica.records["l1"].deleted);
}

#[tokio::test]
async fn collections_are_per_user() {
    let stack = TestStack::new();
    stack
        .server
        .write("7", EntityKind::Surveys, RecordWrite::new("s", json!({})))
        .await
        .unwrap();
    assert_eq!(stack.pull_all(EntityKind::Surveys, "7", 5).await.len(), 1);
    assert!(stack.pull_all(EntityKind::Surveys, "8", 5).await.is_empty());
}

#[tokio::test]
async fn short_page_ends_sync_with_every_record() {
    let stack = TestStack::with_config(test_config().with_max_pull_limit(10));
    for i in 0..25 {
        stack
            .server
            .write("7", EntityKind::Cards, RecordWrite::new(format!("c{i:02}"), json!({})))
            .await
            .unwrap();
    }

    let (records, pulls) = stack.pull_until_short(EntityKind::Cards, "7", 10).await;
    assert_eq!(records.len(), 25);
    assert_eq!(pulls, 3);
}

#[tokio::test]
async fn limit_above_maximum_is_invalid_request() {
    let stack = TestStack::with_config(test_config().with_max_pull_limit(10));
    for i in 0..12 {
        stack
            .server
            .write("7", EntityKind::Cards, RecordWrite::new(format!("c{i:02}"), json!({})))
            .await
            .unwrap();
    }

    let response = stack.pull(EntityKind::Cards, "7", None, 20).await;
    assert_eq!(response.failure_code(), Some(FailureCode::InvalidRequest));
    assert!(response.records.is_empty());

    let at_maximum = stack.pull(EntityKind::Cards, "7", None, 10).await;
    assert_eq!(at_maximum.records.len(), 10);
}

#[tokio::test]
async fn unsupported_pair_fails_instead_of_empty_page() {
    let stack = TestStack::new();
    stack.user("7", zh_en());
    stack.user("8", unsupported_pair());

    let supported = stack.pull(EntityKind::Definitions, "7", None, 10).await;
    assert!(supported.is_success());
    assert!(supported.records.is_empty());

    let unsupported = stack.pull(EntityKind::Definitions, "8", None, 10).await;
    assert_eq!(unsupported.failure_code(), Some(FailureCode::NotImplemented));
    let unsupported = stack.pull(EntityKind::WordModelStats, "8", None, 10).await;
    assert_eq!(unsupported.failure_code(), Some(FailureCode::NotImplemented));
}

#[tokio::test]
async fn malformed_numeric_checkpoint_is_invalid_request() {
    let stack = TestStack::new();
    stack.user("7", zh_en());
    let response = stack
        .pull(
            EntityKind::DayModelStats,
            "7",
            Some(&Checkpoint::new("yesterday", 5.0)),
            10,
        )
        .await;
    assert_eq!(response.failure_code(), Some(FailureCode::InvalidRequest));
}

#[tokio::test]
async fn writes_notify_the_change_channel() {
    let stack = TestStack::new();
    let mut changes = stack.server.subscribe_changes("7");
    let mut cards = stack
        .server
        .notifier()
        .subscribe(ChannelName::for_user(EntityKind::Cards, "7"));

    stack
        .server
        .write("7", EntityKind::Cards, RecordWrite::new("c", json!({})))
        .await
        .unwrap();
    assert_eq!(changes.recv().await.as_deref(), Some("cards"));
    assert_eq!(cards.recv().await.as_deref(), Some("cards"));

    stack
        .server
        .record_word_events("7", &[WordEvent::seen("猫", TEST_EPOCH)])
        .await
        .unwrap();
    assert_eq!(changes.recv().await.as_deref(), Some("wordmodelstats"));
    assert_eq!(changes.recv().await.as_deref(), Some("daymodelstats"));
}

async fn wait_for_subscriber(stack: &TestStack, user_id: &str) {
    let channel = ChannelName::changed(user_id);
    for _ in 0..200 {
        if stack.server.notifier().subscriber_count(&channel) > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("connection never subscribed");
}

#[tokio::test]
async fn connection_forwards_until_shutdown() {
    let stack = TestStack::new();
    let (mut tx, mut rx) = mpsc::channel::<String>(16);
    let server = stack.server.clone();
    let connection = tokio::spawn(async move { server.serve_connection("7", &mut tx).await });
    wait_for_subscriber(&stack, "7").await;

    stack
        .server
        .write("7", EntityKind::Cards, RecordWrite::new("c", json!({})))
        .await
        .unwrap();
    stack
        .server
        .write("7", EntityKind::Imports, RecordWrite::new("i", json!({})))
        .await
        .unwrap();
    assert_eq!(rx.recv().await.as_deref(), Some("cards"));
    assert_eq!(rx.recv().await.as_deref(), Some("imports"));

    stack.server.shutdown();
    let forwarded = connection.await.unwrap().unwrap();
    assert_eq!(forwarded, 2);
    assert_eq!(stack.server.notifier().channel_count(), 0);
}

#[tokio::test]
async fn closed_connection_releases_subscription() {
    let stack = TestStack::new();
    let (mut tx, rx) = mpsc::channel::<String>(16);
    let server = stack.server.clone();
    let connection = tokio::spawn(async move { server.serve_connection("7", &mut tx).await });
    wait_for_subscriber(&stack, "7").await;

    drop(rx);
    stack
        .server
        .write("7", EntityKind::Cards, RecordWrite::new("c", json!({})))
        .await
        .unwrap();
    let forwarded = connection.await.unwrap().unwrap();
    assert_eq!(forwarded, 0);
    assert_eq!(
        stack
            .server
            .notifier()
            .subscriber_count(&ChannelName::changed("7")),
        0
    );
}

#[tokio::test]
async fn idle_connection_releases_subscription_on_disconnect() {
    let stack = TestStack::new();
    let (mut tx, rx) = mpsc::channel::<String>(16);
    let server = stack.server.clone();
    let connection = tokio::spawn(async move { server.serve_connection("7", &mut tx).await });
    wait_for_subscriber(&stack, "7").await;

    // No write follows: the disconnect alone must end the connection.
    drop(rx);
    let forwarded = tokio::time::timeout(Duration::from_secs(2), connection)
        .await
        .expect("connection outlived its client")
        .unwrap()
        .unwrap();
    assert_eq!(forwarded, 0);
    assert_eq!(
        stack
            .server
            .notifier()
            .subscriber_count(&ChannelName::changed("7")),
        0
    );
    assert_eq!(stack.server.notifier().channel_count(), 0);
}

#[tokio::test]
async fn serving_after_shutdown_is_rejected() {
    let stack = TestStack::new();
    stack.server.shutdown();
    let (mut tx, _rx) = mpsc::channel::<String>(1);
    let err = stack.server.serve_connection("7", &mut tx).await.unwrap_err();
    assert!(matches!(err, ServerError::ShutDown));
}

fn apply_batches(batches: Vec<Vec<RecordWrite>>, limit: u32, pull_every: usize) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let stack = TestStack::new();
        let mut replica = Replica::new();
        for (n, batch) in batches.into_iter().enumerate() {
            for write in batch {
                stack.server.write("7", EntityKind::Cards, write).await.unwrap();
            }
            stack.tick(1.0);
            if n % pull_every == 0 {
                replica.sync(&stack, EntityKind::Cards, "7", limit).await;
            }
        }
        replica.sync(&stack, EntityKind::Cards, "7", limit).await;

        let mut fresh = Replica::new();
        fresh.sync(&stack, EntityKind::Cards, "7", 1_000).await;
        prop_assert_eq!(replica.live_ids(), fresh.live_ids());
        for (id, record) in &fresh.records {
            prop_assert_eq!(replica.records.get(id), Some(record));
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn incremental_sync_converges_to_fresh_sync(
        batches in write_batches_strategy(12),
        limit in 1u32..5,
        pull_every in 1usize..4,
    ) {
        apply_batches(batches, limit, pull_every)?;
    }
}
