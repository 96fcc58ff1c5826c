//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.
//! Result types that travel to clients derive `Serialize` with camelCase fields.

use crate::errors::RoomError;
use crate::media::MediaKind;

use super::peer::Peer;
use super::room::RoomActorHandle;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `RoomRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Return the live room for `room_id`, creating it if absent.
    GetOrCreateRoom {
        room_id: String,
        respond_to: oneshot::Sender<Result<RoomActorHandle, RoomError>>,
    },

    /// Look up an existing room.
    GetRoom {
        room_id: String,
        respond_to: oneshot::Sender<Result<RoomActorHandle, RoomError>>,
    },

    /// Remove the room iff it has no peers. Responds `true` if removed.
    RemoveIfEmpty {
        room_id: String,
        respond_to: oneshot::Sender<Result<bool, RoomError>>,
    },

    /// Outcome of a seal started by `RemoveIfEmpty`. Posted by the
    /// registry's own seal task; `room` identifies the actor that was asked.
    RetireIfSealed {
        room_id: String,
        room: RoomActorHandle,
        sealed: Result<bool, RoomError>,
        respond_to: oneshot::Sender<Result<bool, RoomError>>,
    },

    /// Get current registry status (for health checks).
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Stop accepting rooms and cancel every room actor.
    Shutdown {
        /// Deadline for shutdown.
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },
}

/// Messages sent to `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// Register a peer as a member. Duplicate ids are rejected.
    AddPeer {
        peer: Peer,
        respond_to: oneshot::Sender<Result<RoomSnapshot, RoomError>>,
    },

    /// Close a peer (cascade) and drop it from membership.
    RemovePeer {
        peer_id: String,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Router capability descriptor, creating the router on first use.
    GetRouterRtpCapabilities {
        respond_to: oneshot::Sender<Result<Value, RoomError>>,
    },

    CreateTransport {
        peer_id: String,
        direction: Option<TransportDirection>,
        respond_to: oneshot::Sender<Result<TransportDescriptor, RoomError>>,
    },

    ConnectTransport {
        peer_id: String,
        transport_id: String,
        dtls_parameters: Value,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Publish a track. Responds with the producer id.
    Produce {
        peer_id: String,
        transport_id: String,
        kind: MediaKind,
        rtp_parameters: Value,
        respond_to: oneshot::Sender<Result<String, RoomError>>,
    },

    /// Subscribe to another peer's track.
    Consume {
        peer_id: String,
        transport_id: String,
        producer_id: String,
        rtp_capabilities: Value,
        paused: bool,
        respond_to: oneshot::Sender<Result<ConsumerDescriptor, RoomError>>,
    },

    ResumeConsumer {
        peer_id: String,
        consumer_id: String,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Close one of the peer's producers. Closing twice is a no-op.
    CloseProducer {
        peer_id: String,
        producer_id: String,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Snapshot of every producer held by any member.
    ListProducers {
        respond_to: oneshot::Sender<Vec<ProducerInfo>>,
    },

    /// Room id and member list.
    GetSnapshot {
        respond_to: oneshot::Sender<RoomSnapshot>,
    },

    /// Internal counters (for debugging/health).
    GetState {
        respond_to: oneshot::Sender<RoomState>,
    },

    /// Seal the room against further joins iff it has no peers.
    SealIfEmpty { respond_to: oneshot::Sender<bool> },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Status of the `RoomRegistryActor`.
#[derive(Debug, Clone)]
pub struct RegistryStatus {
    /// Total live rooms.
    pub room_count: usize,
    /// Total peers across all rooms.
    pub peer_count: usize,
    /// Whether the registry is draining.
    pub is_draining: bool,
    /// Current mailbox depth.
    pub mailbox_depth: usize,
}

/// Internal state of one room.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room_id: String,
    pub peer_count: usize,
    pub transport_count: usize,
    pub producer_count: usize,
    pub consumer_count: usize,
    pub router_created: bool,
    pub is_sealed: bool,
    pub created_at: i64,
    pub mailbox_depth: usize,
}

/// Member of a room as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub id: String,
    pub display_name: String,
}

/// Room id and members, returned on join and by `getMyRoomInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: String,
    pub peers: Vec<PeerInfo>,
}

/// One active producer and the peer that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub producer_id: String,
    pub owner_peer_id: String,
    pub kind: MediaKind,
}

/// Direction hint supplied when a transport is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

/// Negotiation parameters for a new transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    pub id: String,
    pub ice_parameters: Value,
    pub ice_candidates: Value,
    pub dtls_parameters: Value,
}

/// Parameters a client needs to start receiving a consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    #[serde(rename = "type")]
    pub consumer_type: String,
    pub producer_paused: bool,
    pub paused: bool,
}

/// Server-initiated messages pushed to a peer's connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notification", content = "data")]
pub enum Notification {
    /// Producers published by other members.
    #[serde(rename = "newProducers")]
    NewProducers { producers: Vec<ProducerInfo> },

    /// One of this peer's consumers was closed because its producer closed.
    #[serde(rename = "consumerClosed", rename_all = "camelCase")]
    ConsumerClosed { consumer_id: String },
}

impl Notification {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Notification::NewProducers { .. } => "new_producers",
            Notification::ConsumerClosed { .. } => "consumer_closed",
        }
    }
}
