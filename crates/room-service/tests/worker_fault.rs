//! Worker death is fatal to the service.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use room_service::errors::RoomError;
use room_test_utils::{test_config_with, MockMediaEngine, TestRoomServer};

#[tokio::test]
async fn test_worker_death_stops_server() {
    let server = TestRoomServer::spawn().await.unwrap();
    let health = server.health();
    assert!(health.is_ready());

    let mut alice = server.connect().await.unwrap();
    alice.join("r1", "Alice").await.unwrap();
    alice.transport("send").await.unwrap();

    let worker_id = server.engine().worker_ids().first().cloned().unwrap();
    let engine = server.engine().clone();
    assert!(engine.kill_worker(&worker_id));

    let result = server.wait(Duration::from_secs(10)).await.unwrap();
    assert!(matches!(result, Err(RoomError::WorkerFault(_))));
    assert!(!health.is_ready());
    assert_eq!(engine.open_transport_count(), 0);

    // The connection is closed by the server.
    assert!(alice.next_frame(Duration::from_secs(5)).await.is_err());
}

#[tokio::test]
async fn test_start_fails_when_workers_cannot_be_created() {
    let engine = MockMediaEngine::builder()
        .failing(room_test_utils::MockOperation::CreateWorker)
        .build();

    let result = TestRoomServer::spawn_with(engine.clone(), test_config_with(&[])).await;

    assert!(result.is_err());
    assert!(engine.worker_ids().is_empty());
}

#[tokio::test]
async fn test_rooms_spread_across_configured_workers() {
    let engine = MockMediaEngine::new();
    let server =
        TestRoomServer::spawn_with(engine.clone(), test_config_with(&[("ROOM_NUM_WORKERS", "3")]))
            .await
            .unwrap();

    let mut clients = Vec::new();
    for room in ["r1", "r2", "r3"] {
        let mut client = server.connect().await.unwrap();
        client.join(room, "Alice").await.unwrap();
        // Routers are created on first use.
        client.transport("send").await.unwrap();
        clients.push(client);
    }

    let worker_ids = engine.worker_ids();
    assert_eq!(worker_ids.len(), 3);
    for worker_id in &worker_ids {
        assert_eq!(engine.router_count(worker_id), 1);
    }

    server.shutdown().await.unwrap();
}
