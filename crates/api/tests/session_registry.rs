//! Unit tests for `SessionRegistry`, exercised without any HTTP upgrade.

use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::Utc;
use cronhub_api::ws::SessionRegistry;
use cronhub_core::types::WorkerId;
use cronhub_db::models::worker::Worker;

fn worker(name: &str) -> Worker {
    let now = Utc::now();
    Worker {
        id: WorkerId::new_v4(),
        team_id: None,
        name: name.to_string(),
        description: String::new(),
        is_active: true,
        last_active: Some(now),
        metadata: serde_json::json!({}),
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Test: add / remove / count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_count() {
    let registry = SessionRegistry::new();
    assert_eq!(registry.count().await, 0);

    let _rx1 = registry.add("s1".into()).await;
    let _rx2 = registry.add("s2".into()).await;
    assert_eq!(registry.count().await, 2);

    registry.remove("s1").await;
    assert_eq!(registry.count().await, 1);
}

#[tokio::test]
async fn remove_is_idempotent() {
    let registry = SessionRegistry::new();
    let _rx = registry.add("s1".into()).await;

    assert_eq!(registry.remove("s1").await, None);
    assert_eq!(registry.remove("s1").await, None);
    assert_eq!(registry.remove("unknown").await, None);
    assert_eq!(registry.count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: worker binding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_binds_and_overwrites() {
    let registry = SessionRegistry::new();
    let _rx = registry.add("s1".into()).await;
    assert!(registry.get_workers().await.is_empty());

    let first = worker("alpha");
    assert!(registry.register_worker("s1", first.clone()).await);
    assert_eq!(registry.worker_for_session("s1").await, Some(first.id));

    let second = worker("beta");
    assert!(registry.register_worker("s1", second.clone()).await);

    let live = registry.get_workers().await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].session_id, "s1");
    assert_eq!(live[0].worker.name, "beta");

    assert_eq!(registry.remove("s1").await, Some(second.id));
}

#[tokio::test]
async fn register_on_missing_session_is_refused() {
    let registry = SessionRegistry::new();
    assert!(!registry.register_worker("gone", worker("alpha")).await);
}

#[tokio::test]
async fn snapshot_is_a_copy() {
    let registry = SessionRegistry::new();
    let _rx = registry.add("s1".into()).await;
    registry.register_worker("s1", worker("alpha")).await;

    let snapshot = registry.get_workers().await;
    registry.remove("s1").await;

    assert_eq!(snapshot.len(), 1);
    assert!(registry.get_workers().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: targeted sends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_to_worker_reaches_only_its_session() {
    let registry = SessionRegistry::new();
    let mut rx1 = registry.add("s1".into()).await;
    let mut rx2 = registry.add("s2".into()).await;
    let w1 = worker("alpha");
    registry.register_worker("s1", w1.clone()).await;

    assert!(registry.send_to_worker(w1.id, Message::Text("hi".into())).await);
    assert!(!registry.send_to_worker(WorkerId::new_v4(), Message::Text("x".into())).await);

    assert!(matches!(rx1.try_recv(), Ok(Message::Text(t)) if t.as_str() == "hi"));
    assert!(rx2.try_recv().is_err());
    assert!(registry.has_worker(w1.id).await);
}

#[tokio::test]
async fn send_to_closed_session_reports_false() {
    let registry = SessionRegistry::new();
    let rx = registry.add("s1".into()).await;
    drop(rx);

    assert!(!registry.send_to_session("s1", Message::Text("x".into())).await);
    assert!(!registry.send_to_session("unknown", Message::Text("x".into())).await);
}

// ---------------------------------------------------------------------------
// Test: shutdown and heartbeat fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let registry = SessionRegistry::new();
    let mut rx1 = registry.add("s1".into()).await;
    let mut rx2 = registry.add("s2".into()).await;

    registry.shutdown_all().await;

    assert_eq!(registry.count().await, 0);
    assert!(matches!(rx1.recv().await, Some(Message::Close(None))));
    assert!(matches!(rx2.recv().await, Some(Message::Close(None))));
}

#[tokio::test]
async fn ping_all_reaches_every_session() {
    let registry = SessionRegistry::new();
    let mut rx1 = registry.add("s1".into()).await;
    let mut rx2 = registry.add("s2".into()).await;

    registry.ping_all().await;

    assert!(matches!(rx1.recv().await, Some(Message::Ping(_))));
    assert!(matches!(rx2.recv().await, Some(Message::Ping(_))));
}

// ---------------------------------------------------------------------------
// Test: concurrent add/remove leaves a consistent map
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_stay_consistent() {
    let registry = Arc::new(SessionRegistry::new());

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let id = format!("s{i}");
                let rx = registry.add(id.clone()).await;
                registry.register_worker(&id, worker(&id)).await;
                if i % 2 == 0 {
                    registry.remove(&id).await;
                }
                rx
            })
        })
        .collect();

    let mut receivers = Vec::new();
    for handle in handles {
        receivers.push(handle.await.unwrap());
    }

    assert_eq!(registry.count().await, 32);
    assert_eq!(registry.get_workers().await.len(), 32);
}
