//! End-to-end signaling tests over a real WebSocket.
//!
//! Each test spawns a room server backed by the in-memory media engine and
//! drives it with one or more signaling clients.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use room_service::errors::RoomError;
use room_test_utils::{audio_only_rtp_capabilities, MockOperation, TestRoomServer};
use serde_json::{json, Value};

const QUIET_PERIOD: Duration = Duration::from_millis(200);

fn own_peer_id(snapshot: &Value) -> String {
    snapshot["peers"]
        .as_array()
        .unwrap()
        .last()
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_two_peer_room_lifecycle() {
    let server = TestRoomServer::spawn().await.unwrap();
    let registry = server.registry();
    let mut alice = server.connect().await.unwrap();
    let mut bob = server.connect().await.unwrap();

    let alice_id = own_peer_id(&alice.join("r1", "Alice").await.unwrap());
    let snapshot = bob.join("r1", "Bob").await.unwrap();
    assert_eq!(snapshot["id"], "r1");
    assert_eq!(snapshot["peers"].as_array().unwrap().len(), 2);

    // Alice publishes video; Bob, already in the room, is told about it.
    let send = alice.transport("send").await.unwrap();
    let producer_id = alice.produce(&send, "video").await.unwrap();

    let notification = bob.next_notification().await.unwrap();
    assert_eq!(
        notification,
        json!({
            "notification": "newProducers",
            "data": {
                "producers": [{ "producerId": producer_id, "ownerPeerId": alice_id, "kind": "video" }]
            }
        })
    );

    // Bob consumes it.
    let recv = bob.transport("recv").await.unwrap();
    let consumer = bob.consume(&recv, &producer_id).await.unwrap();
    assert_eq!(consumer["producerId"], producer_id.as_str());
    assert_eq!(consumer["kind"], "video");
    let consumer_id = consumer["id"].as_str().unwrap().to_string();

    // Alice drops; Bob's consumer closes and the room stays.
    alice.close().await.unwrap();
    let notification = bob.next_notification().await.unwrap();
    assert_eq!(
        notification,
        json!({ "notification": "consumerClosed", "data": { "consumerId": consumer_id } })
    );
    let info = bob.call("getMyRoomInfo", json!({})).await.unwrap();
    assert_eq!(info["peers"].as_array().unwrap().len(), 1);
    assert!(registry.get_room("r1").await.is_ok());

    // Bob exits; the empty room is removed.
    bob.call("exitRoom", json!({})).await.unwrap();
    assert!(matches!(
        registry.get_room("r1").await,
        Err(RoomError::RoomNotFound(_))
    ));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_new_producer_broadcast_skips_publisher() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut alice = server.connect().await.unwrap();
    let mut bob = server.connect().await.unwrap();
    let mut carol = server.connect().await.unwrap();

    alice.join("r1", "Alice").await.unwrap();
    bob.join("r1", "Bob").await.unwrap();
    carol.join("r1", "Carol").await.unwrap();

    let send = alice.transport("send").await.unwrap();
    let producer_id = alice.produce(&send, "audio").await.unwrap();

    for client in [&mut bob, &mut carol] {
        let notification = client.next_notification().await.unwrap();
        assert_eq!(notification["notification"], "newProducers");
        assert_eq!(
            notification["data"]["producers"][0]["producerId"],
            producer_id.as_str()
        );
    }
    alice.expect_no_notification(QUIET_PERIOD).await.unwrap();

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_late_joiner_sees_existing_producer_once() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut alice = server.connect().await.unwrap();
    let mut carol = server.connect().await.unwrap();

    alice.join("r1", "Alice").await.unwrap();
    let send = alice.transport("send").await.unwrap();
    let producer_id = alice.produce(&send, "video").await.unwrap();

    carol.join("r1", "Carol").await.unwrap();
    let producers = carol.call("getProducers", json!({})).await.unwrap();
    let producers = producers.as_array().unwrap();
    assert_eq!(producers.len(), 1);
    assert_eq!(producers[0]["producerId"], producer_id.as_str());

    carol.expect_no_notification(QUIET_PERIOD).await.unwrap();

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_double_producer_closed_is_idempotent() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut alice = server.connect().await.unwrap();
    let mut bob = server.connect().await.unwrap();

    alice.join("r1", "Alice").await.unwrap();
    bob.join("r1", "Bob").await.unwrap();
    let send = alice.transport("send").await.unwrap();
    let producer_id = alice.produce(&send, "audio").await.unwrap();
    bob.next_notification().await.unwrap();

    let recv = bob.transport("recv").await.unwrap();
    let consumer = bob.consume(&recv, &producer_id).await.unwrap();

    alice
        .send("producerClosed", json!({ "producerId": producer_id }))
        .await
        .unwrap();
    alice
        .send("producerClosed", json!({ "producerId": producer_id }))
        .await
        .unwrap();

    // The next response proves both fire-and-forget frames were handled.
    let producers = alice.call("getProducers", json!({})).await.unwrap();
    assert_eq!(producers, json!([]));

    let notification = bob.next_notification().await.unwrap();
    assert_eq!(notification["notification"], "consumerClosed");
    assert_eq!(notification["data"]["consumerId"], consumer["id"]);
    bob.expect_no_notification(QUIET_PERIOD).await.unwrap();

    assert_eq!(server.engine().open_producer_count(), 0);
    assert_eq!(server.engine().open_consumer_count(), 0);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_incompatible_consume_creates_nothing() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut alice = server.connect().await.unwrap();
    let mut bob = server.connect().await.unwrap();

    alice.join("r1", "Alice").await.unwrap();
    bob.join("r1", "Bob").await.unwrap();
    let send = alice.transport("send").await.unwrap();
    let producer_id = alice.produce(&send, "video").await.unwrap();

    let recv = bob.transport("recv").await.unwrap();
    let code = bob
        .call_err(
            "consume",
            json!({
                "transportId": recv,
                "producerId": producer_id,
                "rtpCapabilities": audio_only_rtp_capabilities(),
            }),
        )
        .await
        .unwrap();

    assert_eq!(code, "capability-mismatch");
    assert_eq!(server.engine().open_consumer_count(), 0);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_releases_everything_the_peer_owned() {
    let server = TestRoomServer::spawn().await.unwrap();
    let engine = server.engine().clone();
    let mut alice = server.connect().await.unwrap();
    let mut bob = server.connect().await.unwrap();

    alice.join("r1", "Alice").await.unwrap();
    bob.join("r1", "Bob").await.unwrap();

    // Alice: two producers and one consumer of Bob's producer.
    let alice_send = alice.transport("send").await.unwrap();
    let alice_recv = alice.transport("recv").await.unwrap();
    let audio = alice.produce(&alice_send, "audio").await.unwrap();
    let video = alice.produce(&alice_send, "video").await.unwrap();

    let bob_send = bob.transport("send").await.unwrap();
    let bob_recv = bob.transport("recv").await.unwrap();
    let bob_audio = bob.produce(&bob_send, "audio").await.unwrap();
    alice.consume(&alice_recv, &bob_audio).await.unwrap();

    let audio_consumer = bob.consume(&bob_recv, &audio).await.unwrap();
    let video_consumer = bob.consume(&bob_recv, &video).await.unwrap();

    // Discard the newProducers notifications seen so far.
    for _ in 0..2 {
        assert_eq!(
            bob.next_notification().await.unwrap()["notification"],
            "newProducers"
        );
    }

    alice.close().await.unwrap();

    let mut closed = Vec::new();
    for _ in 0..2 {
        let notification = bob.next_notification().await.unwrap();
        assert_eq!(notification["notification"], "consumerClosed");
        closed.push(notification["data"]["consumerId"].as_str().unwrap().to_string());
    }
    closed.sort();
    let mut expected = vec![
        audio_consumer["id"].as_str().unwrap().to_string(),
        video_consumer["id"].as_str().unwrap().to_string(),
    ];
    expected.sort();
    assert_eq!(closed, expected);

    let producers = bob.call("getProducers", json!({})).await.unwrap();
    let producers = producers.as_array().unwrap();
    assert_eq!(producers.len(), 1);
    assert_eq!(producers[0]["producerId"], bob_audio.as_str());

    // Only Bob's send/recv transports and producer remain.
    assert_eq!(engine.open_transport_count(), 2);
    assert_eq!(engine.open_producer_count(), 1);
    assert_eq!(engine.open_consumer_count(), 0);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_requests_outside_session_state_fail_fast() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut client = server.connect().await.unwrap();

    let code = client
        .call_err("getRouterRtpCapabilities", json!({}))
        .await
        .unwrap();
    assert_eq!(code, "invalid-state");

    client.join("r1", "Alice").await.unwrap();
    let code = client
        .call_err("join", json!({ "roomId": "r2", "displayName": "Alice" }))
        .await
        .unwrap();
    assert_eq!(code, "invalid-state");

    let code = client
        .call_err(
            "connectTransport",
            json!({ "transportId": "t1", "dtlsParameters": {} }),
        )
        .await
        .unwrap();
    assert_eq!(code, "invalid-state");

    let caps = client
        .call("getRouterRtpCapabilities", json!({}))
        .await
        .unwrap();
    assert!(caps["codecs"].as_array().is_some_and(|c| !c.is_empty()));

    let transport = client.transport("send").await.unwrap();
    let code = client
        .call_err(
            "consume",
            json!({ "transportId": transport, "producerId": "missing", "rtpCapabilities": caps }),
        )
        .await
        .unwrap();
    assert_eq!(code, "producer-not-found");

    // exitRoom makes the connection joinable again.
    client.call("exitRoom", json!({})).await.unwrap();
    client.join("r2", "Alice").await.unwrap();

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_frames_get_invalid_request() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut client = server.connect().await.unwrap();

    client.send_raw("{not json").await.unwrap();
    let response = client.next_frame(Duration::from_secs(5)).await.unwrap();
    assert_eq!(response["id"], Value::Null);
    assert_eq!(response["ok"], false);
    assert_eq!(response["error"]["code"], "invalid-request");

    let code = client.call_err("teleport", json!({})).await.unwrap();
    assert_eq!(code, "invalid-request");

    let code = client.call_err("join", json!({ "roomId": 7 })).await.unwrap();
    assert_eq!(code, "invalid-request");

    // The connection is still usable.
    client.join("r1", "Alice").await.unwrap();

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_engine_failure_is_reported_and_recoverable() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut alice = server.connect().await.unwrap();

    alice.join("r1", "Alice").await.unwrap();
    let send = alice.transport("send").await.unwrap();

    server.engine().fail_next(MockOperation::Produce);
    let code = alice
        .call_err(
            "produce",
            json!({ "transportId": send, "kind": "audio", "rtpParameters": {} }),
        )
        .await
        .unwrap();
    assert_eq!(code, "engine-failure");
    assert_eq!(
        alice.call("getProducers", json!({})).await.unwrap(),
        json!([])
    );

    alice.produce(&send, "audio").await.unwrap();

    server.shutdown().await.unwrap();
}
