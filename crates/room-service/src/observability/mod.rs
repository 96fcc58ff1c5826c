//! Observability for the room service.
//!
//! # Privacy by Default
//!
//! Actor loops use `#[instrument(skip_all)]` with explicit fields. Display
//! names and negotiation blobs are never logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `room_rooms_active` | Gauge | none | Live rooms |
//! | `room_peers_active` | Gauge | none | Joined peers across rooms |
//! | `room_signaling_requests_total` | Counter | `method`, `status` | Handled requests |
//! | `room_signaling_request_duration_seconds` | Histogram | `method` | Request latency |
//! | `room_notifications_dropped_total` | Counter | `notification` | Outbox overflow |
//! | `room_worker_assignments_total` | Counter | none | Rooms placed on workers |
//! | `room_worker_faults_total` | Counter | none | Worker deaths |
//! | `room_actor_panics_total` | Counter | `actor_type` | Actor panics |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_directives`. With `json` set,
/// events are written as one JSON object per line.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(default_directives: &str, json: bool) -> Result<(), String> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}
