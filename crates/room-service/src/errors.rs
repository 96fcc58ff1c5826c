//! Room Service error types.
//!
//! Every error maps to a stable signaling error code for client responses.
//! Internal details are logged server-side but not exposed to clients.

use crate::media::MediaError;
use thiserror::Error;

/// Room Service error type.
///
/// Maps to signaling error codes:
/// - `RoomNotFound`, `RoomClosing`: `room-not-found`
/// - `PeerNotFound`: `peer-not-found`, `DeadPeer`: `dead-peer`
/// - `TransportNotFound`, `ProducerNotFound`, `ConsumerNotFound`: `*-not-found`
/// - `CapabilityMismatch`: `capability-mismatch`
/// - `Engine`: `engine-failure`, `WorkerFault`: `worker-fault`
/// - `Conflict`, `InvalidState`, `InvalidRequest`, `Draining`: same-named codes
/// - `Config`, `Internal`: `internal`
#[derive(Debug, Error)]
pub enum RoomError {
    /// Room does not exist in the registry.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Room was sealed for removal while the request was in flight.
    #[error("Room is closing: {0}")]
    RoomClosing(String),

    /// Peer is not a member of the room.
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Peer has already been closed and holds no engine resources.
    #[error("Peer already closed: {0}")]
    DeadPeer(String),

    /// Transport id unknown for this peer.
    #[error("Transport not found: {0}")]
    TransportNotFound(String),

    /// Producer id unknown in this room.
    #[error("Producer not found: {0}")]
    ProducerNotFound(String),

    /// Consumer id unknown for this peer.
    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),

    /// Receiver capabilities cannot consume the producer.
    #[error("Cannot consume producer: {0}")]
    CapabilityMismatch(String),

    /// A media engine call failed.
    #[error("Media engine error: {0}")]
    Engine(String),

    /// A media engine worker died. Fatal to the service.
    #[error("Media worker fault: {0}")]
    WorkerFault(String),

    /// Conflict error (e.g., peer id already in room).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request not allowed in the current session state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed or unknown signaling request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Service is shutting down and accepts no new rooms.
    #[error("Service is draining")]
    Draining,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal consistency fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the signaling error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound(_) | RoomError::RoomClosing(_) => "room-not-found",
            RoomError::PeerNotFound(_) => "peer-not-found",
            RoomError::DeadPeer(_) => "dead-peer",
            RoomError::TransportNotFound(_) => "transport-not-found",
            RoomError::ProducerNotFound(_) => "producer-not-found",
            RoomError::ConsumerNotFound(_) => "consumer-not-found",
            RoomError::CapabilityMismatch(_) => "capability-mismatch",
            RoomError::Engine(_) => "engine-failure",
            RoomError::WorkerFault(_) => "worker-fault",
            RoomError::Conflict(_) => "conflict",
            RoomError::InvalidState(_) => "invalid-state",
            RoomError::InvalidRequest(_) => "invalid-request",
            RoomError::Draining => "draining",
            RoomError::Config(_) | RoomError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RoomError::RoomNotFound(_) | RoomError::RoomClosing(_) => "Room not found".to_string(),
            RoomError::PeerNotFound(_) => "Peer not found in room".to_string(),
            RoomError::DeadPeer(_) => "Peer has already left the room".to_string(),
            RoomError::TransportNotFound(_) => "Transport not found".to_string(),
            RoomError::ProducerNotFound(_) => "Producer not found".to_string(),
            RoomError::ConsumerNotFound(_) => "Consumer not found".to_string(),
            RoomError::CapabilityMismatch(_) => "Cannot consume this producer".to_string(),
            RoomError::Engine(_) => "Media server operation failed".to_string(),
            RoomError::WorkerFault(_) => "Media server unavailable".to_string(),
            RoomError::Draining => "Server is shutting down, please reconnect".to_string(),
            RoomError::Config(_) | RoomError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            RoomError::Conflict(msg)
            | RoomError::InvalidState(msg)
            | RoomError::InvalidRequest(msg) => msg.clone(),
        }
    }
}

impl From<MediaError> for RoomError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::WorkerDied(reason) => RoomError::WorkerFault(reason),
            other => RoomError::Engine(other.to_string()),
        }
    }
}
