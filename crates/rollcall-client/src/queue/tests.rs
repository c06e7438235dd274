//! Queue storage tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use rollcall_core::wire::ActionKind;

use super::{QueueDatabase, QueueStatus, STALE_SYNC_SECS};

async fn test_db() -> QueueDatabase {
    QueueDatabase::open_in_memory().await.unwrap()
}

#[tokio::test]
async fn enqueue_creates_pending_item() {
    let db = test_db().await;
    let enq = db
        .enqueue("alice", ActionKind::CheckIn, "e1", r#"{"token":"t"}"#)
        .await
        .unwrap();

    assert!(enq.created);
    assert_eq!(enq.item.queue_status().unwrap(), QueueStatus::Pending);
    assert_eq!(enq.item.action_kind().unwrap(), ActionKind::CheckIn);
    assert_eq!(enq.item.payload, r#"{"token":"t"}"#);
    assert!(enq.item.reason.is_none());

    let sync = enq.item.to_sync_item().unwrap();
    assert_eq!(sync.correlation_id, enq.item.local_id);
    assert_eq!(sync.event_id, "e1");
}

#[tokio::test]
async fn repeated_taps_are_deduplicated() {
    let db = test_db().await;
    let first = db.enqueue("alice", ActionKind::Register, "e1", "").await.unwrap();
    let second = db.enqueue("alice", ActionKind::Register, "e1", "").await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.item.local_id, second.item.local_id);
    assert_eq!(db.list_items("alice", true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn dedup_is_per_owner_action_and_event() {
    let db = test_db().await;
    db.enqueue("alice", ActionKind::Register, "e1", "").await.unwrap();

    assert!(db.enqueue("bob", ActionKind::Register, "e1", "").await.unwrap().created);
    assert!(db.enqueue("alice", ActionKind::Unregister, "e1", "").await.unwrap().created);
    assert!(db.enqueue("alice", ActionKind::Register, "e2", "").await.unwrap().created);
}

#[tokio::test]
async fn in_flight_item_also_blocks_duplicates() {
    let db = test_db().await;
    let first = db.enqueue("alice", ActionKind::CheckIn, "e1", "p1").await.unwrap();
    db.claim_pending("alice").await.unwrap();

    let again = db.enqueue("alice", ActionKind::CheckIn, "e1", "p2").await.unwrap();
    assert!(!again.created);
    assert_eq!(again.item.local_id, first.item.local_id);
    assert_eq!(again.item.queue_status().unwrap(), QueueStatus::Syncing);
    assert_eq!(again.item.payload, "p1");
}

#[tokio::test]
async fn pending_duplicate_takes_the_newest_payload() {
    let db = test_db().await;
    let first = db.enqueue("alice", ActionKind::CheckIn, "e1", "p1").await.unwrap();
    db.enqueue("alice", ActionKind::CheckIn, "e2", "other").await.unwrap();

    let again = db.enqueue("alice", ActionKind::CheckIn, "e1", "p2").await.unwrap();
    assert!(!again.created);
    assert_eq!(again.item.local_id, first.item.local_id);
    assert_eq!(again.item.payload, "p2");
    assert_eq!(again.item.queued_at, first.item.queued_at);

    let pending = db.pending_for_owner("alice").await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].local_id, first.item.local_id);
    assert_eq!(pending[0].payload, "p2");
}

#[tokio::test]
async fn finished_item_allows_a_new_capture() {
    let db = test_db().await;
    let first = db.enqueue("alice", ActionKind::CheckIn, "e1", "p1").await.unwrap();
    db.claim_pending("alice").await.unwrap();
    db.finish(&first.item.local_id, QueueStatus::Rejected, "stale")
        .await
        .unwrap();

    let again = db.enqueue("alice", ActionKind::CheckIn, "e1", "p2").await.unwrap();
    assert!(again.created);
    assert_ne!(again.item.local_id, first.item.local_id);
}

#[tokio::test]
async fn claim_is_owner_scoped_and_ordered() {
    let db = test_db().await;
    let a1 = db.enqueue("alice", ActionKind::Register, "e1", "").await.unwrap();
    db.enqueue("bob", ActionKind::Register, "e1", "").await.unwrap();
    let a2 = db.enqueue("alice", ActionKind::Register, "e2", "").await.unwrap();
    let a3 = db.enqueue("alice", ActionKind::CheckIn, "e1", "p").await.unwrap();

    let claimed = db.claim_pending("alice").await.unwrap();
    let ids: Vec<&str> = claimed.iter().map(|i| i.local_id.as_str()).collect();
    assert_eq!(
        ids,
        [
            a1.item.local_id.as_str(),
            a2.item.local_id.as_str(),
            a3.item.local_id.as_str()
        ]
    );
    assert!(claimed.iter().all(|i| i.status == "SYNCING"));

    assert!(db.claim_pending("alice").await.unwrap().is_empty());
    assert_eq!(db.pending_for_owner("bob").await.unwrap().len(), 1);
}

#[tokio::test]
async fn finish_records_reason_only_for_in_flight_items() {
    let db = test_db().await;
    let item = db.enqueue("alice", ActionKind::Register, "e1", "").await.unwrap().item;

    assert!(!db.finish(&item.local_id, QueueStatus::Verified, "ok").await.unwrap());

    db.claim_pending("alice").await.unwrap();
    assert!(db.finish(&item.local_id, QueueStatus::Verified, "Registered as confirmed").await.unwrap());

    let stored = db.get_item(&item.local_id).await.unwrap();
    assert_eq!(stored.queue_status().unwrap(), QueueStatus::Verified);
    assert_eq!(stored.reason.as_deref(), Some("Registered as confirmed"));
}

#[tokio::test]
async fn finish_refuses_non_terminal_status() {
    let db = test_db().await;
    assert!(db.finish("x", QueueStatus::Pending, "").await.is_err());
}

#[tokio::test]
async fn return_to_pending_and_recovery() {
    let db = test_db().await;
    let one = db.enqueue("alice", ActionKind::Register, "e1", "").await.unwrap().item;
    let two = db.enqueue("alice", ActionKind::Register, "e2", "").await.unwrap().item;
    db.claim_pending("alice").await.unwrap();

    assert_eq!(db.return_to_pending(&[one.local_id.clone()]).await.unwrap(), 1);
    assert_eq!(db.pending_for_owner("alice").await.unwrap().len(), 1);

    assert_eq!(db.recover_interrupted(0).await.unwrap(), 1);
    let pending = db.pending_for_owner("alice").await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[1].local_id, two.local_id);
}

#[tokio::test]
async fn listing_hides_finished_items_by_default() {
    let db = test_db().await;
    let done = db.enqueue("alice", ActionKind::Register, "e1", "").await.unwrap().item;
    db.claim_pending("alice").await.unwrap();
    db.finish(&done.local_id, QueueStatus::Verified, "ok").await.unwrap();
    db.enqueue("alice", ActionKind::Register, "e2", "").await.unwrap();

    assert_eq!(db.list_items("alice", false).await.unwrap().len(), 1);
    assert_eq!(db.list_items("alice", true).await.unwrap().len(), 2);
}

#[tokio::test]
async fn queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let db = QueueDatabase::open(&path).await.unwrap();
    db.enqueue("alice", ActionKind::Register, "e1", "").await.unwrap();
    db.claim_pending("alice").await.unwrap();
    age_syncing_items(&db, STALE_SYNC_SECS).await;
    db.pool().close().await;

    let reopened = QueueDatabase::open(&path).await.unwrap();
    assert_eq!(reopened.recover_interrupted(STALE_SYNC_SECS).await.unwrap(), 1);
    assert_eq!(reopened.pending_for_owner("alice").await.unwrap().len(), 1);
}

/// Backdate every in-flight item's claim time by `secs`.
async fn age_syncing_items(db: &QueueDatabase, secs: i64) {
    sqlx::query("UPDATE queue_items SET updated_at = updated_at - ? WHERE status = 'SYNCING'")
        .bind(secs)
        .execute(db.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn second_process_leaves_a_live_drain_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let first = QueueDatabase::open(&path).await.unwrap();
    let item = first
        .enqueue("alice", ActionKind::CheckIn, "e1", "p1")
        .await
        .unwrap()
        .item;
    assert_eq!(first.claim_pending("alice").await.unwrap().len(), 1);

    let second = QueueDatabase::open(&path).await.unwrap();
    assert_eq!(second.recover_interrupted(STALE_SYNC_SECS).await.unwrap(), 0);
    assert!(second.claim_pending("alice").await.unwrap().is_empty());

    assert!(first.finish(&item.local_id, QueueStatus::Verified, "ok").await.unwrap());
    let done = second.get_item(&item.local_id).await.unwrap();
    assert_eq!(done.queue_status().unwrap(), QueueStatus::Verified);
}

#[tokio::test]
async fn abandoned_drain_is_recovered_by_the_next_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let crashed = QueueDatabase::open(&path).await.unwrap();
    let item = crashed
        .enqueue("alice", ActionKind::CheckIn, "e1", "p1")
        .await
        .unwrap()
        .item;
    crashed.claim_pending("alice").await.unwrap();
    age_syncing_items(&crashed, STALE_SYNC_SECS).await;

    let next = QueueDatabase::open(&path).await.unwrap();
    assert_eq!(next.recover_interrupted(STALE_SYNC_SECS).await.unwrap(), 1);
    let reclaimed = next.claim_pending("alice").await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].local_id, item.local_id);
}
