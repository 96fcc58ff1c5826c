//! Signaling gateway: wire protocol and per-connection sessions.
//!
//! The transport (WebSocket framing, outbound queue) lives in
//! [`crate::server::ws`]; this module is transport-agnostic.

pub mod protocol;
pub mod session;

pub use protocol::{ClientFrame, ErrorBody, Request, Response};
pub use session::{SessionState, SignalingSession};
