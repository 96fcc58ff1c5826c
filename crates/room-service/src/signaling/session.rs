//! Per-connection signaling state machine.
//!
//! ```text
//! Connecting --join--> Joined --createWebRtcTransport--> Active
//!     ^                  |                                  |
//!     +----exitRoom------+-------------exitRoom-------------+
//!                        |                                  |
//!                        +--disconnect--> Leaving --> Closed <+
//! ```
//!
//! A session is driven by exactly one connection task, so it needs no
//! synchronization of its own. Requests that are not allowed in the current
//! state fail fast with `invalid-state`.

use crate::actors::{Notification, Peer, RoomActorHandle, RoomRegistryHandle};
use crate::errors::RoomError;
use crate::observability::metrics as prom;

use super::protocol::Request;

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Joins racing a room removal retry against a fresh room this many times.
const JOIN_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, not in a room.
    Connecting,
    /// Registered in a room; may create transports.
    Joined,
    /// At least one transport exists; may produce and consume.
    Active,
    /// Cleanup in progress.
    Leaving,
    /// Terminal.
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Joined => "joined",
            SessionState::Active => "active",
            SessionState::Leaving => "leaving",
            SessionState::Closed => "closed",
        }
    }
}

/// Signaling session for one client connection.
pub struct SignalingSession {
    peer_id: String,
    registry: RoomRegistryHandle,
    outbox: mpsc::Sender<Notification>,
    state: SessionState,
    room: Option<RoomActorHandle>,
}

impl SignalingSession {
    /// Create a session. Notifications for this peer are queued on `outbox`.
    #[must_use]
    pub fn new(
        peer_id: impl Into<String>,
        registry: RoomRegistryHandle,
        outbox: mpsc::Sender<Notification>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            registry,
            outbox,
            state: SessionState::Connecting,
            room: None,
        }
    }

    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Room id of the joined room, if any.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        self.room.as_ref().map(RoomActorHandle::room_id)
    }

    /// Handle one request and return its result payload.
    ///
    /// `producerClosed` returns `Value::Null`; callers do not answer it.
    pub async fn handle(&mut self, request: Request) -> Result<Value, RoomError> {
        let method = request.method();
        let start = Instant::now();

        let result = self.dispatch(request).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.error_code(),
        };
        prom::record_signaling_request(method, status, start.elapsed());

        if let Err(e) = &result {
            debug!(
                target: "room.signaling",
                peer_id = %self.peer_id,
                method = method,
                state = self.state.as_str(),
                error = %e,
                "Signaling request failed"
            );
        }

        result
    }

    /// Clean up after connection loss. Idempotent.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Err(e) = self.leave().await {
            warn!(
                target: "room.signaling",
                peer_id = %self.peer_id,
                error = %e,
                "Cleanup after disconnect failed"
            );
        }

        self.state = SessionState::Closed;
        debug!(target: "room.signaling", peer_id = %self.peer_id, "Session closed");
    }

    fn check_state(&self, request: &Request) -> Result<(), RoomError> {
        let allowed = match request {
            Request::Join { .. } => self.state == SessionState::Connecting,
            Request::ConnectTransport { .. }
            | Request::Produce { .. }
            | Request::Consume { .. }
            | Request::ResumeConsumer { .. } => self.state == SessionState::Active,
            Request::GetRouterRtpCapabilities
            | Request::CreateWebRtcTransport { .. }
            | Request::GetProducers
            | Request::ProducerClosed { .. }
            | Request::GetMyRoomInfo
            | Request::ExitRoom => {
                matches!(self.state, SessionState::Joined | SessionState::Active)
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(RoomError::InvalidState(format!(
                "{} not allowed while {}",
                request.method(),
                self.state.as_str()
            )))
        }
    }

    fn joined_room(&self) -> Result<RoomActorHandle, RoomError> {
        self.room
            .clone()
            .ok_or_else(|| RoomError::InvalidState("not in a room".to_string()))
    }

    async fn dispatch(&mut self, request: Request) -> Result<Value, RoomError> {
        if let Request::ProducerClosed { .. } = &request {
            // Fire-and-forget: nothing to report outside a room.
            if self.room.is_none() {
                return Ok(Value::Null);
            }
        }
        self.check_state(&request)?;

        match request {
            Request::Join {
                room_id,
                display_name,
            } => self.join(&room_id, &display_name).await,
            Request::GetRouterRtpCapabilities => {
                self.joined_room()?.router_rtp_capabilities().await
            }
            Request::CreateWebRtcTransport { direction } => {
                let descriptor = self
                    .joined_room()?
                    .create_transport(&self.peer_id, direction)
                    .await?;
                self.state = SessionState::Active;
                to_json(&descriptor)
            }
            Request::ConnectTransport {
                transport_id,
                dtls_parameters,
            } => {
                self.joined_room()?
                    .connect_transport(&self.peer_id, &transport_id, dtls_parameters)
                    .await?;
                Ok(json!({}))
            }
            Request::Produce {
                transport_id,
                kind,
                rtp_parameters,
            } => {
                let producer_id = self
                    .joined_room()?
                    .produce(&self.peer_id, &transport_id, kind, rtp_parameters)
                    .await?;
                Ok(json!({ "producerId": producer_id }))
            }
            Request::Consume {
                transport_id,
                producer_id,
                rtp_capabilities,
                paused,
            } => {
                let descriptor = self
                    .joined_room()?
                    .consume(
                        &self.peer_id,
                        &transport_id,
                        &producer_id,
                        rtp_capabilities,
                        paused,
                    )
                    .await?;
                to_json(&descriptor)
            }
            Request::ResumeConsumer { consumer_id } => {
                self.joined_room()?
                    .resume_consumer(&self.peer_id, &consumer_id)
                    .await?;
                Ok(json!({}))
            }
            Request::GetProducers => {
                let producers = self.joined_room()?.list_producers().await?;
                to_json(&producers)
            }
            Request::ProducerClosed { producer_id } => {
                self.joined_room()?
                    .close_producer(&self.peer_id, &producer_id)
                    .await?;
                Ok(Value::Null)
            }
            Request::GetMyRoomInfo => {
                let snapshot = self.joined_room()?.snapshot().await?;
                to_json(&snapshot)
            }
            Request::ExitRoom => {
                self.leave().await?;
                self.state = SessionState::Connecting;
                Ok(json!({}))
            }
        }
    }

    async fn join(&mut self, room_id: &str, display_name: &str) -> Result<Value, RoomError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let room = self.registry.get_or_create_room(room_id).await?;
            let peer = Peer::new(self.peer_id.as_str(), display_name, self.outbox.clone());

            match room.add_peer(peer).await {
                Ok(snapshot) => {
                    info!(
                        target: "room.signaling",
                        peer_id = %self.peer_id,
                        room_id = %room_id,
                        peers = snapshot.peers.len(),
                        "Peer joined room"
                    );
                    self.room = Some(room);
                    self.state = SessionState::Joined;
                    return to_json(&snapshot);
                }
                Err(RoomError::RoomClosing(_)) if attempt < JOIN_ATTEMPTS => {
                    debug!(
                        target: "room.signaling",
                        peer_id = %self.peer_id,
                        room_id = %room_id,
                        attempt = attempt,
                        "Room closing during join, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Leave the current room, removing it from the registry if it is now
    /// empty. A room that is already gone counts as left.
    async fn leave(&mut self) -> Result<(), RoomError> {
        let Some(room) = self.room.take() else {
            return Ok(());
        };
        self.state = SessionState::Leaving;

        let removed = match room.remove_peer(&self.peer_id).await {
            Ok(()) | Err(RoomError::PeerNotFound(_) | RoomError::RoomClosing(_)) => Ok(()),
            Err(e) => Err(e),
        };

        match self.registry.remove_if_empty(room.room_id()).await {
            Ok(true) => debug!(
                target: "room.signaling",
                room_id = %room.room_id(),
                "Last peer left, room removed"
            ),
            Ok(false) => {}
            Err(e) => debug!(
                target: "room.signaling",
                room_id = %room.room_id(),
                error = %e,
                "Room removal skipped"
            ),
        }

        info!(
            target: "room.signaling",
            peer_id = %self.peer_id,
            room_id = %room.room_id(),
            "Peer left room"
        );
        removed
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, RoomError> {
    serde_json::to_value(value).map_err(|e| RoomError::Internal(format!("serialize failed: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{ActorMetrics, ProducerInfo, RoomSettings, TransportDirection};
    use crate::media::mock::MockMediaEngine;
    use crate::media::{
        default_media_codecs, ListenIp, MediaKind, WebRtcTransportOptions, WorkerSettings,
    };
    use crate::workers::WorkerPool;
    use std::sync::Arc;

    async fn registry() -> (RoomRegistryHandle, MockMediaEngine) {
        let engine = MockMediaEngine::new();
        let worker_settings = WorkerSettings {
            log_level: "warn".to_string(),
            rtc_min_port: 10000,
            rtc_max_port: 10100,
        };
        let pool = Arc::new(
            WorkerPool::start(&engine, &worker_settings, 2)
                .await
                .unwrap(),
        );
        let settings = Arc::new(RoomSettings {
            media_codecs: default_media_codecs(),
            transport_options: WebRtcTransportOptions {
                listen_ips: vec![ListenIp {
                    ip: "127.0.0.1".to_string(),
                    announced_ip: None,
                }],
                enable_udp: true,
                enable_tcp: true,
                prefer_udp: true,
                initial_available_outgoing_bitrate: 1_000_000,
            },
            max_incoming_bitrate: None,
        });
        let registry =
            RoomRegistryHandle::new("room-test".to_string(), pool, settings, ActorMetrics::new());
        (registry, engine)
    }

    fn session(
        peer_id: &str,
        registry: &RoomRegistryHandle,
    ) -> (SignalingSession, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(16);
        (SignalingSession::new(peer_id, registry.clone(), tx), rx)
    }

    fn join(room_id: &str, name: &str) -> Request {
        Request::Join {
            room_id: room_id.to_string(),
            display_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_join_returns_snapshot() {
        let (registry, _engine) = registry().await;
        let (mut alice, _rx) = session("alice", &registry);

        let snapshot = alice.handle(join("r1", "Alice")).await.unwrap();

        assert_eq!(alice.state(), SessionState::Joined);
        assert_eq!(alice.room_id(), Some("r1"));
        assert_eq!(
            snapshot,
            json!({ "id": "r1", "peers": [{ "id": "alice", "displayName": "Alice" }] })
        );
        registry.cancel();
    }

    #[tokio::test]
    async fn test_requests_rejected_outside_allowed_states() {
        let (registry, _engine) = registry().await;
        let (mut alice, _rx) = session("alice", &registry);

        let before_join = alice.handle(Request::GetProducers).await;
        assert!(matches!(before_join, Err(RoomError::InvalidState(_))));

        alice.handle(join("r1", "Alice")).await.unwrap();

        let rejoin = alice.handle(join("r2", "Alice")).await;
        assert!(matches!(rejoin, Err(RoomError::InvalidState(_))));

        let produce_without_transport = alice
            .handle(Request::Produce {
                transport_id: "t".to_string(),
                kind: MediaKind::Audio,
                rtp_parameters: json!({}),
            })
            .await;
        assert!(matches!(
            produce_without_transport,
            Err(RoomError::InvalidState(_))
        ));

        alice
            .handle(Request::CreateWebRtcTransport {
                direction: Some(TransportDirection::Send),
            })
            .await
            .unwrap();
        assert_eq!(alice.state(), SessionState::Active);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_produce_reaches_other_session() {
        let (registry, _engine) = registry().await;
        let (mut alice, mut alice_rx) = session("alice", &registry);
        let (mut bob, mut bob_rx) = session("bob", &registry);

        alice.handle(join("r1", "Alice")).await.unwrap();
        bob.handle(join("r1", "Bob")).await.unwrap();

        let transport = alice
            .handle(Request::CreateWebRtcTransport { direction: None })
            .await
            .unwrap();
        let transport_id = transport["id"].as_str().unwrap().to_string();
        let produced = alice
            .handle(Request::Produce {
                transport_id,
                kind: MediaKind::Audio,
                rtp_parameters: json!({}),
            })
            .await
            .unwrap();
        let producer_id = produced["producerId"].as_str().unwrap();

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            Notification::NewProducers {
                producers: vec![ProducerInfo {
                    producer_id: producer_id.to_string(),
                    owner_peer_id: "alice".to_string(),
                    kind: MediaKind::Audio,
                }],
            }
        );
        assert!(alice_rx.try_recv().is_err());

        registry.cancel();
    }

    #[tokio::test]
    async fn test_exit_room_returns_to_connecting_and_removes_empty_room() {
        let (registry, _engine) = registry().await;
        let (mut alice, _rx) = session("alice", &registry);

        alice.handle(join("r1", "Alice")).await.unwrap();
        alice.handle(Request::ExitRoom).await.unwrap();

        assert_eq!(alice.state(), SessionState::Connecting);
        assert_eq!(alice.room_id(), None);
        assert!(matches!(
            registry.get_room("r1").await,
            Err(RoomError::RoomNotFound(_))
        ));

        // A session that left may join again.
        alice.handle(join("r1", "Alice")).await.unwrap();
        assert_eq!(alice.state(), SessionState::Joined);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_disconnect_closes_session() {
        let (registry, _engine) = registry().await;
        let (mut alice, _alice_rx) = session("alice", &registry);
        let (mut bob, _bob_rx) = session("bob", &registry);

        alice.handle(join("r1", "Alice")).await.unwrap();
        bob.handle(join("r1", "Bob")).await.unwrap();

        alice.disconnect().await;
        alice.disconnect().await;

        assert_eq!(alice.state(), SessionState::Closed);
        let after_close = alice.handle(Request::GetMyRoomInfo).await;
        assert!(matches!(after_close, Err(RoomError::InvalidState(_))));

        // Fire-and-forget requests are ignored once closed.
        let closed = alice
            .handle(Request::ProducerClosed {
                producer_id: "p1".to_string(),
            })
            .await
            .unwrap();
        assert!(closed.is_null());

        let info = bob.handle(Request::GetMyRoomInfo).await.unwrap();
        assert_eq!(info["peers"].as_array().unwrap().len(), 1);

        registry.cancel();
    }
}
