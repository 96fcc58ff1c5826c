//! Room Service Library
//!
//! Orchestrates multi-party real-time media sessions on top of an external
//! media engine (SFU). The service owns rooms, peers and their transport,
//! producer and consumer handles; the engine moves the packets.
//!
//! - Fixed worker pool with round-robin room placement
//! - One actor per room owning membership and media state
//! - WebSocket signaling with a per-connection state machine
//! - New-producer fan-out and consumer-close notifications
//! - Health probes and Prometheus metrics
//!
//! # Architecture
//!
//! ```text
//! RoomServer (axum)
//! ├── WorkerPool (N media engine workers)
//! └── RoomRegistryActor (singleton)
//!     └── RoomActor (one per room) ── router on an assigned worker
//!         └── Peer (transports, producers, consumers)
//!
//! WebSocket connection ── SignalingSession ── RoomActorHandle
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Registry and room actors, peers, actor metrics
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with signaling error codes
//! - [`media`] - Media engine abstraction
//! - [`observability`] - Health probes, Prometheus metrics, tracing setup
//! - [`server`] - HTTP server and WebSocket transport
//! - [`signaling`] - Wire protocol and per-connection sessions
//! - [`workers`] - Media worker pool
//!
//! The crate ships no binary: the media engine is supplied by the embedder
//! through [`media::MediaEngine`].

pub mod actors;
pub mod config;
pub mod errors;
pub mod media;
pub mod observability;
pub mod server;
pub mod signaling;
pub mod workers;
