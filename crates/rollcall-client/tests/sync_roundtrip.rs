//! Client queue against a live server on a loopback port.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use serde_json::json;

use rollcall_core::config::CheckinConfig;
use rollcall_core::wire::ActionKind;

use rollcall_client::drain::{DrainError, DrainReport, QueueDrainer};
use rollcall_client::queue::{QueueDatabase, QueueStatus};
use rollcall_client::transport::HttpTransport;
use rollcall_server::auth::CheckinTokenManager;
use rollcall_server::server::{AppState, build_router};
use rollcall_server::storage::{CreateEventParams, ServerDatabase};

struct Server {
    url: String,
    state: AppState,
}

async fn start_server(capacity: Option<i64>) -> Server {
    let db = ServerDatabase::open_in_memory().await.unwrap();
    db.create_event(&CreateEventParams {
        id: "e1",
        host_id: "host-1",
        title: "Lab tour",
        starts_at: 0,
        ends_at: 3600,
        capacity,
        host_secret: "tour-secret",
    })
    .await
    .unwrap();

    let tokens = Arc::new(CheckinTokenManager::new(b"roundtrip-key", 6 * 60 * 60));
    let state = AppState::new(db, tokens, CheckinConfig::default());
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        url: format!("http://{addr}"),
        state,
    }
}

fn scanned(server: &Server) -> String {
    let (token, _) = server.state.tokens.issue("e1", "tour-secret").unwrap();
    json!({ "token": token }).to_string()
}

#[tokio::test]
async fn queued_actions_sync_against_live_server() {
    let server = start_server(Some(10)).await;
    let queue = QueueDatabase::open_in_memory().await.unwrap();

    let payload = scanned(&server);
    let check_in = queue
        .enqueue("alice", ActionKind::CheckIn, "e1", &payload)
        .await
        .unwrap()
        .item;
    let bogus = queue
        .enqueue("alice", ActionKind::Register, "no-such-event", "")
        .await
        .unwrap()
        .item;
    queue
        .enqueue("bob", ActionKind::Register, "e1", "")
        .await
        .unwrap();

    let drainer = QueueDrainer::new(queue.clone(), HttpTransport::new(&server.url).unwrap());
    let report = drainer.drain("alice").await.unwrap();
    assert_eq!(
        report,
        DrainReport::Completed {
            verified: 1,
            rejected: 1,
            returned: 0
        }
    );

    let stored = queue.get_item(&check_in.local_id).await.unwrap();
    assert_eq!(stored.queue_status().unwrap(), QueueStatus::Verified);
    let stored = queue.get_item(&bogus.local_id).await.unwrap();
    assert_eq!(stored.queue_status().unwrap(), QueueStatus::Rejected);
    assert_eq!(stored.reason.as_deref(), Some("Event not found"));

    let db = &server.state.db;
    assert!(db.get_attendance("e1", "alice").await.unwrap().is_some());
    assert!(db.get_registration_for("e1", "bob").await.unwrap().is_none());
}

#[tokio::test]
async fn replaying_a_capture_is_harmless() {
    let server = start_server(None).await;
    let queue = QueueDatabase::open_in_memory().await.unwrap();
    let drainer = QueueDrainer::new(queue.clone(), HttpTransport::new(&server.url).unwrap());
    let payload = scanned(&server);

    for _ in 0..2 {
        queue
            .enqueue("alice", ActionKind::CheckIn, "e1", &payload)
            .await
            .unwrap();
        let report = drainer.drain("alice").await.unwrap();
        assert!(matches!(report, DrainReport::Completed { verified: 1, .. }));
    }

    assert_eq!(server.state.db.count_attendance("e1").await.unwrap(), 1);
    assert_eq!(queue.list_items("alice", true).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unreachable_server_keeps_actions_pending() {
    // Bind then drop to get a port with nothing listening.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let queue = QueueDatabase::open_in_memory().await.unwrap();
    queue
        .enqueue("alice", ActionKind::Register, "e1", "")
        .await
        .unwrap();

    let drainer = QueueDrainer::new(
        queue.clone(),
        HttpTransport::new(&format!("http://{addr}")).unwrap(),
    );
    let err = drainer.drain("alice").await.unwrap_err();
    assert!(matches!(err, DrainError::Transport(_)));
    assert_eq!(queue.pending_for_owner("alice").await.unwrap().len(), 1);
}
