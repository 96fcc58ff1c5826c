//! # Room Test Utilities
//!
//! Shared test utilities for the Room Service.
//!
//! ## Modules
//!
//! - `fixtures` - Test configuration and RTP capability/parameter payloads
//! - `server_harness` - Spawns a real room server on a random port
//! - `signaling_client` - WebSocket signaling client for end-to-end tests
//!
//! The in-memory media engine lives in `room_service::media::mock` (behind
//! the `test-utils` feature) and is re-exported here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = TestRoomServer::spawn().await.unwrap();
//!     let mut alice = server.connect().await.unwrap();
//!
//!     let snapshot = alice.join("r1", "Alice").await.unwrap();
//!     assert_eq!(snapshot["peers"].as_array().unwrap().len(), 1);
//!
//!     server.shutdown().await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod signaling_client;

pub use fixtures::*;
pub use room_service::media::mock::{MockMediaEngine, MockMediaEngineBuilder, MockOperation};
pub use server_harness::TestRoomServer;
pub use signaling_client::TestSignalingClient;
