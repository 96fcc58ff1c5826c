//! HTTP server: signaling WebSocket, health probes and `/metrics`.
//!
//! # Lifecycle
//!
//! 1. [`RoomServer::start`] starts the worker pool and the room registry and
//!    marks the service ready.
//! 2. [`RoomServer::serve`] runs until the caller's shutdown future resolves,
//!    a media worker dies, or the listener fails.
//! 3. On exit readiness is dropped, open connections are told to close, the
//!    registry shuts every room down and the workers are closed.
//!
//! A worker death is reported as [`RoomError::WorkerFault`]. Embedders are
//! expected to exit the process on it.

pub mod ws;

use crate::actors::{ActorMetrics, RoomRegistryHandle};
use crate::config::Config;
use crate::errors::RoomError;
use crate::media::MediaEngine;
use crate::observability::{health_router, HealthState};
use crate::workers::WorkerPool;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Time the registry gets to close every room on shutdown.
const REGISTRY_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Time the HTTP server gets to finish in-flight connections on shutdown.
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared with the WebSocket handler.
#[derive(Clone)]
pub struct ServerState {
    pub registry: RoomRegistryHandle,
    /// Cancelled when the server stops; open connections close on it.
    pub shutdown: CancellationToken,
}

/// A started room service.
pub struct RoomServer {
    config: Config,
    pool: Arc<WorkerPool>,
    registry: RoomRegistryHandle,
    health: Arc<HealthState>,
    metrics: Arc<ActorMetrics>,
    shutdown: CancellationToken,
}

impl RoomServer {
    /// Start the worker pool and registry.
    ///
    /// # Errors
    ///
    /// Fails if any media worker cannot be created.
    pub async fn start(config: Config, engine: &dyn MediaEngine) -> Result<Self, RoomError> {
        info!(
            target: "room.server",
            service_id = %config.service_id,
            num_workers = config.num_workers,
            "Starting room service"
        );

        let pool = Arc::new(
            WorkerPool::start(engine, &config.worker_settings(), config.num_workers).await?,
        );
        let metrics = ActorMetrics::new();
        let registry = RoomRegistryHandle::new(
            config.service_id.clone(),
            Arc::clone(&pool),
            Arc::new(config.room_settings()),
            Arc::clone(&metrics),
        );

        let health = Arc::new(HealthState::new());
        health.set_ready();

        Ok(Self {
            config,
            pool,
            registry,
            health,
            metrics,
            shutdown: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> RoomRegistryHandle {
        self.registry.clone()
    }

    #[must_use]
    pub fn health(&self) -> Arc<HealthState> {
        Arc::clone(&self.health)
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<ActorMetrics> {
        Arc::clone(&self.metrics)
    }

    #[must_use]
    pub fn pool(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.pool)
    }

    /// Build the application routes.
    ///
    /// - `<ws_path>` - signaling WebSocket upgrade
    /// - `/health`, `/liveness`, `/ready`, `/readiness` - probes
    /// - `/metrics` - Prometheus text, when a handle is supplied
    pub fn router(&self, prometheus: Option<PrometheusHandle>) -> Router {
        let state = Arc::new(ServerState {
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
        });

        let mut app = Router::new()
            .route(&self.config.ws_path, get(ws::ws_handler))
            .with_state(state)
            .merge(health_router(Arc::clone(&self.health)));

        if let Some(handle) = prometheus {
            app = app.route(
                "/metrics",
                get(move || {
                    let handle = handle.clone();
                    async move { handle.render() }
                }),
            );
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until `shutdown` resolves or a worker dies, then
    /// shut down.
    ///
    /// # Errors
    ///
    /// `WorkerFault` if a media worker died, `Internal` if the HTTP server
    /// failed.
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        shutdown: F,
        prometheus: Option<PrometheusHandle>,
    ) -> Result<(), RoomError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router(prometheus);
        match listener.local_addr() {
            Ok(addr) => info!(
                target: "room.server",
                addr = %addr,
                ws_path = %self.config.ws_path,
                "Room server listening"
            ),
            Err(e) => warn!(target: "room.server", error = %e, "Listener address unavailable"),
        }

        let drain_token = self.shutdown.clone();
        let mut server_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain_token.cancelled().await })
                .await
        });

        let fault_token = self.pool.fault_token();
        let result = tokio::select! {
            () = shutdown => {
                info!(target: "room.server", "Shutdown requested");
                Ok(())
            }
            () = fault_token.cancelled() => {
                error!(
                    target: "room.server",
                    service_id = %self.config.service_id,
                    "Media worker died, stopping service"
                );
                Err(RoomError::WorkerFault("media worker died".to_string()))
            }
            joined = &mut server_task => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(target: "room.server", error = %e, "HTTP server failed");
                    Err(RoomError::Internal(format!("HTTP server failed: {e}")))
                }
                Err(e) => {
                    error!(target: "room.server", error = %e, "HTTP server task failed");
                    Err(RoomError::Internal(format!("HTTP server task failed: {e}")))
                }
            },
        };

        self.stop(server_task).await;
        result
    }

    async fn stop(&self, server_task: tokio::task::JoinHandle<std::io::Result<()>>) {
        self.health.set_not_ready();
        self.shutdown.cancel();

        if !server_task.is_finished()
            && tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server_task)
                .await
                .is_err()
        {
            warn!(
                target: "room.server",
                timeout_secs = SERVER_DRAIN_TIMEOUT.as_secs(),
                "HTTP server did not drain in time"
            );
        }

        match self.registry.shutdown(REGISTRY_SHUTDOWN_TIMEOUT).await {
            Ok(()) => {
                // Rooms release their engine resources before the actor exits.
                let _ = tokio::time::timeout(REGISTRY_SHUTDOWN_TIMEOUT, self.registry.closed())
                    .await;
            }
            Err(e) => warn!(target: "room.server", error = %e, "Registry shutdown error"),
        }
        self.pool.close();

        info!(
            target: "room.server",
            service_id = %self.config.service_id,
            "Room service stopped"
        );
    }
}
