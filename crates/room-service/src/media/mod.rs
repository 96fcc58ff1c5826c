//! Media engine capability surface.
//!
//! The room service never forwards media itself. It drives an external
//! media-relay engine through these traits and reacts to the lifecycle events
//! the engine pushes back on typed channels:
//!
//! - [`WorkerEvent`] on the channel handed to [`MediaEngine::create_worker`]
//! - [`MediaEvent`] on the channel handed to [`MediaWorker::create_router`]
//!
//! Negotiation blobs (ICE, DTLS, RTP parameters and capabilities) are opaque
//! JSON values passed through unchanged between client and engine.

mod codecs;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use codecs::default_media_codecs;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by a media engine implementation.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The engine rejected or failed the operation.
    #[error("Media operation failed: {0}")]
    Failed(String),

    /// The target object was already closed.
    #[error("Media object closed")]
    Closed,

    /// The worker hosting the object died.
    #[error("Media worker died: {0}")]
    WorkerDied(String),
}

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One codec a router is able to route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub kind: MediaKind,
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters: serde_json::Map<String, Value>,
}

/// Settings used to spawn each engine worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub log_level: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
}

/// Local address a transport listens on, with an optional public address
/// announced in ICE candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenIp {
    pub ip: String,
    pub announced_ip: Option<String>,
}

/// Options for creating a WebRTC transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebRtcTransportOptions {
    pub listen_ips: Vec<ListenIp>,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
    pub initial_available_outgoing_bitrate: u32,
}

/// Negotiation parameters generated by the engine for a new transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportParameters {
    pub ice_parameters: Value,
    pub ice_candidates: Value,
    pub dtls_parameters: Value,
}

/// Worker lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The worker process died. Not recoverable.
    Died { worker_id: String, reason: String },
}

/// Why the engine closed a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerCloseReason {
    /// The producer it was subscribed to closed.
    ProducerClosed,
    /// The receiving transport it lived on closed.
    TransportClosed,
}

/// Router-scoped lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The transport's DTLS session closed; the transport is no longer usable.
    TransportClosed { transport_id: String },
    /// The producer was closed because its transport closed.
    ProducerClosed { producer_id: String },
    /// The consumer was closed by the engine.
    ConsumerClosed {
        consumer_id: String,
        reason: ConsumerCloseReason,
    },
}

/// Entry point to the engine: spawns workers.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_worker(
        &self,
        settings: &WorkerSettings,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Arc<dyn MediaWorker>, MediaError>;
}

/// One engine worker. Hosts routers.
#[async_trait]
pub trait MediaWorker: Send + Sync {
    fn id(&self) -> &str;

    async fn create_router(
        &self,
        media_codecs: &[RtpCodecCapability],
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Arc<dyn MediaRouter>, MediaError>;

    fn close(&self);
}

/// A router relays media between the transports of one room.
#[async_trait]
pub trait MediaRouter: Send + Sync {
    fn id(&self) -> &str;

    /// Capability descriptor clients load before producing or consuming.
    fn rtp_capabilities(&self) -> Value;

    /// Whether a receiver with `rtp_capabilities` can consume `producer_id`.
    fn can_consume(&self, producer_id: &str, rtp_capabilities: &Value) -> bool;

    async fn create_webrtc_transport(
        &self,
        options: &WebRtcTransportOptions,
    ) -> Result<Arc<dyn MediaTransport>, MediaError>;

    /// Close the router and every transport on it.
    fn close(&self);
}

/// A negotiated WebRTC endpoint.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    fn id(&self) -> &str;

    fn parameters(&self) -> TransportParameters;

    async fn connect(&self, dtls_parameters: Value) -> Result<(), MediaError>;

    async fn set_max_incoming_bitrate(&self, bitrate: u32) -> Result<(), MediaError>;

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<Arc<dyn MediaProducer>, MediaError>;

    async fn consume(
        &self,
        producer_id: &str,
        rtp_capabilities: Value,
        paused: bool,
    ) -> Result<Arc<dyn MediaConsumer>, MediaError>;

    /// Close the transport. Producers and consumers on it close with it.
    fn close(&self);
}

/// One published track.
pub trait MediaProducer: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    fn close(&self);
}

/// One subscription to a producer.
#[async_trait]
pub trait MediaConsumer: Send + Sync {
    fn id(&self) -> &str;

    fn producer_id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    fn rtp_parameters(&self) -> Value;

    /// Engine consumer type (e.g. "simple", "simulcast").
    fn consumer_type(&self) -> String;

    fn producer_paused(&self) -> bool;

    async fn resume(&self) -> Result<(), MediaError>;

    fn close(&self);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_wire_format() {
        assert_eq!(serde_json::to_value(MediaKind::Audio).unwrap(), "audio");
        let kind: MediaKind = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(kind, MediaKind::Video);
        assert!(serde_json::from_str::<MediaKind>("\"data\"").is_err());
    }

    #[test]
    fn test_codec_capability_camel_case() {
        let codec = RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: "audio/opus".to_string(),
            clock_rate: 48000,
            channels: Some(2),
            parameters: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&codec).unwrap();
        assert_eq!(json["mimeType"], "audio/opus");
        assert_eq!(json["clockRate"], 48000);
        assert!(json.get("parameters").is_none());
    }
}
