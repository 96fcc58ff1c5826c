//! Test server harness for E2E testing
//!
//! Provides `TestRoomServer` for spawning real room server instances backed
//! by the in-memory media engine.

use crate::fixtures::test_config;
use crate::signaling_client::TestSignalingClient;
use room_service::actors::RoomRegistryHandle;
use room_service::config::Config;
use room_service::errors::RoomError;
use room_service::media::mock::MockMediaEngine;
use room_service::observability::{init_metrics_recorder, HealthState};
use room_service::server::RoomServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Test harness for spawning the room server in E2E tests
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_join_e2e() -> Result<()> {
///     let server = TestRoomServer::spawn().await?;
///     let mut client = server.connect().await?;
///     client.join("r1", "Alice").await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct TestRoomServer {
    addr: SocketAddr,
    config: Config,
    engine: MockMediaEngine,
    registry: RoomRegistryHandle,
    health: Arc<HealthState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), RoomError>>,
}

impl TestRoomServer {
    /// Spawn a server with a fresh mock engine and the default test config.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(MockMediaEngine::new(), test_config()).await
    }

    /// Spawn a server with the given engine and config.
    ///
    /// The server will:
    /// - Start its worker pool on `engine`
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Serve in the background until `shutdown` or a worker fault
    pub async fn spawn_with(engine: MockMediaEngine, config: Config) -> Result<Self, anyhow::Error> {
        let server = RoomServer::start(config.clone(), &engine)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start room server: {}", e))?;

        // The global recorder may already be installed by another test in
        // this process; fall back to a standalone handle.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                let recorder = PrometheusBuilder::new().build_recorder();
                recorder.handle()
            }
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let registry = server.registry();
        let health = server.health();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(server.serve(
            listener,
            async move {
                let _ = shutdown_rx.await;
            },
            Some(metrics_handle),
        ));

        Ok(Self {
            addr,
            config,
            engine,
            registry,
            health,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    /// WebSocket signaling URL.
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, self.config.ws_path)
    }

    /// Base HTTP URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The engine backing this server, for fault injection and inspection.
    pub fn engine(&self) -> &MockMediaEngine {
        &self.engine
    }

    pub fn registry(&self) -> RoomRegistryHandle {
        self.registry.clone()
    }

    pub fn health(&self) -> Arc<HealthState> {
        Arc::clone(&self.health)
    }

    /// Open a new signaling connection.
    pub async fn connect(&self) -> Result<TestSignalingClient, anyhow::Error> {
        TestSignalingClient::connect(&self.ws_url()).await
    }

    /// Request shutdown and wait for the server to stop.
    pub async fn shutdown(mut self) -> Result<(), anyhow::Error> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.wait(Duration::from_secs(10)).await?.map_err(Into::into)
    }

    /// Wait for the server to stop on its own (e.g. after a worker fault).
    pub async fn wait(self, timeout: Duration) -> Result<Result<(), RoomError>, anyhow::Error> {
        let joined = tokio::time::timeout(timeout, self.handle)
            .await
            .map_err(|_| anyhow::anyhow!("Server did not stop within {timeout:?}"))?;
        joined.map_err(|e| anyhow::anyhow!("Server task failed: {}", e))
    }
}
