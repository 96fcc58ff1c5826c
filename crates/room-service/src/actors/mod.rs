//! Actor model for room orchestration.
//!
//! # Actor Hierarchy
//!
//! ```text
//! RoomRegistryActor (singleton per service instance)
//! └── supervises N RoomActors (one per room)
//!     └── owns the room's Peers and its media router
//! ```
//!
//! Signaling sessions are not actors; each WebSocket connection task drives
//! its own [`crate::signaling::SignalingSession`] and talks to rooms through
//! [`RoomActorHandle`]s.
//!
//! # Cancellation
//!
//! The registry owns the root `CancellationToken`. Each room actor runs on a
//! child token, so cancelling the registry shuts every room down.

pub mod messages;
pub mod metrics;
pub mod peer;
pub mod registry;
pub mod room;

pub use messages::{
    ConsumerDescriptor, Notification, PeerInfo, ProducerInfo, RegistryStatus, RoomSnapshot,
    RoomState, TransportDescriptor, TransportDirection,
};
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
pub use peer::{ConsumerState, Peer};
pub use registry::RoomRegistryHandle;
pub use room::{RoomActor, RoomActorHandle, RoomSettings};
