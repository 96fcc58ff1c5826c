//! Room Service configuration.
//!
//! Configuration is loaded from environment variables. Values that would break
//! a runtime invariant (empty port range, zero workers) are rejected rather than
//! silently replaced by defaults.

use crate::actors::RoomSettings;
use crate::media::{default_media_codecs, ListenIp, WebRtcTransportOptions, WorkerSettings};
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address (signaling WebSocket, health, metrics).
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3016";

/// Default WebSocket signaling path.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Default media engine worker log level.
pub const DEFAULT_WORKER_LOG_LEVEL: &str = "warn";

/// Default lower bound of the RTC port range.
pub const DEFAULT_RTC_MIN_PORT: u16 = 10000;

/// Default upper bound of the RTC port range.
pub const DEFAULT_RTC_MAX_PORT: u16 = 10100;

/// Default transport listen address.
pub const DEFAULT_LISTEN_IP: &str = "0.0.0.0";

/// Default initial outgoing bitrate for new transports (bps).
pub const DEFAULT_INITIAL_OUTGOING_BITRATE: u32 = 1_000_000;

/// Default maximum incoming bitrate per transport (bps).
pub const DEFAULT_MAX_INCOMING_BITRATE: u32 = 1_500_000;

/// Default service instance ID prefix.
pub const DEFAULT_SERVICE_ID_PREFIX: &str = "room";

/// Room Service configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:3016").
    pub bind_address: String,

    /// Path the signaling WebSocket is served on (default: "/ws").
    pub ws_path: String,

    /// Number of media engine workers (default: available parallelism).
    pub num_workers: usize,

    /// Media engine worker log level (default: "warn").
    pub worker_log_level: String,

    /// Lower bound of the RTC port range (default: 10000).
    pub rtc_min_port: u16,

    /// Upper bound of the RTC port range (default: 10100).
    pub rtc_max_port: u16,

    /// Address transports listen on (default: "0.0.0.0").
    pub listen_ip: String,

    /// Public address announced in ICE candidates, if behind NAT.
    pub announced_ip: Option<String>,

    /// Initial available outgoing bitrate for new transports (bps).
    pub initial_outgoing_bitrate: u32,

    /// Maximum incoming bitrate per transport (bps, 0 disables the limit).
    pub max_incoming_bitrate: u32,

    /// Unique identifier for this service instance.
    pub service_id: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("ws_path", &self.ws_path)
            .field("num_workers", &self.num_workers)
            .field("worker_log_level", &self.worker_log_level)
            .field("rtc_ports", &format!("{}-{}", self.rtc_min_port, self.rtc_max_port))
            .field("listen_ip", &self.listen_ip)
            .field("announced_ip", &self.announced_ip)
            .field("initial_outgoing_bitrate", &self.initial_outgoing_bitrate)
            .field("max_incoming_bitrate", &self.max_incoming_bitrate)
            .field("service_id", &self.service_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("ROOM_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let ws_path = vars
            .get("ROOM_WS_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WS_PATH.to_string());
        if !ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "ROOM_WS_PATH must start with '/': {ws_path}"
            )));
        }

        let default_workers = std::thread::available_parallelism().map_or(1, usize::from);
        let num_workers = parse_var(vars, "ROOM_NUM_WORKERS", default_workers)?;
        if num_workers == 0 {
            return Err(ConfigError::InvalidValue(
                "ROOM_NUM_WORKERS must be at least 1".to_string(),
            ));
        }

        let worker_log_level = vars
            .get("ROOM_WORKER_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WORKER_LOG_LEVEL.to_string());

        let rtc_min_port = parse_var(vars, "ROOM_RTC_MIN_PORT", DEFAULT_RTC_MIN_PORT)?;
        let rtc_max_port = parse_var(vars, "ROOM_RTC_MAX_PORT", DEFAULT_RTC_MAX_PORT)?;
        if rtc_min_port > rtc_max_port {
            return Err(ConfigError::InvalidValue(format!(
                "RTC port range is empty: {rtc_min_port}-{rtc_max_port}"
            )));
        }

        let listen_ip = vars
            .get("ROOM_LISTEN_IP")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LISTEN_IP.to_string());

        let announced_ip = vars
            .get("ROOM_ANNOUNCED_IP")
            .filter(|s| !s.is_empty())
            .cloned();

        let initial_outgoing_bitrate = parse_var(
            vars,
            "ROOM_INITIAL_OUTGOING_BITRATE",
            DEFAULT_INITIAL_OUTGOING_BITRATE,
        )?;

        let max_incoming_bitrate = parse_var(
            vars,
            "ROOM_MAX_INCOMING_BITRATE",
            DEFAULT_MAX_INCOMING_BITRATE,
        )?;

        let service_id = vars.get("ROOM_SERVICE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_SERVICE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            ws_path,
            num_workers,
            worker_log_level,
            rtc_min_port,
            rtc_max_port,
            listen_ip,
            announced_ip,
            initial_outgoing_bitrate,
            max_incoming_bitrate,
            service_id,
        })
    }

    /// Settings each media engine worker is spawned with.
    #[must_use]
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            log_level: self.worker_log_level.clone(),
            rtc_min_port: self.rtc_min_port,
            rtc_max_port: self.rtc_max_port,
        }
    }

    /// Per-room router and transport settings.
    #[must_use]
    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            media_codecs: default_media_codecs(),
            transport_options: WebRtcTransportOptions {
                listen_ips: vec![ListenIp {
                    ip: self.listen_ip.clone(),
                    announced_ip: self.announced_ip.clone(),
                }],
                enable_udp: true,
                enable_tcp: true,
                prefer_udp: true,
                initial_available_outgoing_bitrate: self.initial_outgoing_bitrate,
            },
            max_incoming_bitrate: (self.max_incoming_bitrate > 0)
                .then_some(self.max_incoming_bitrate),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let vars = HashMap::new();

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.ws_path, DEFAULT_WS_PATH);
        assert!(config.num_workers >= 1);
        assert_eq!(config.worker_log_level, DEFAULT_WORKER_LOG_LEVEL);
        assert_eq!(config.rtc_min_port, DEFAULT_RTC_MIN_PORT);
        assert_eq!(config.rtc_max_port, DEFAULT_RTC_MAX_PORT);
        assert_eq!(config.listen_ip, DEFAULT_LISTEN_IP);
        assert!(config.announced_ip.is_none());
        assert_eq!(
            config.initial_outgoing_bitrate,
            DEFAULT_INITIAL_OUTGOING_BITRATE
        );
        assert_eq!(config.max_incoming_bitrate, DEFAULT_MAX_INCOMING_BITRATE);
        assert!(config.service_id.starts_with("room-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("ROOM_BIND_ADDRESS".to_string(), "127.0.0.1:4000".to_string()),
            ("ROOM_WS_PATH".to_string(), "/webcam".to_string()),
            ("ROOM_NUM_WORKERS".to_string(), "3".to_string()),
            ("ROOM_WORKER_LOG_LEVEL".to_string(), "debug".to_string()),
            ("ROOM_RTC_MIN_PORT".to_string(), "20000".to_string()),
            ("ROOM_RTC_MAX_PORT".to_string(), "20200".to_string()),
            ("ROOM_LISTEN_IP".to_string(), "10.0.0.5".to_string()),
            ("ROOM_ANNOUNCED_IP".to_string(), "203.0.113.9".to_string()),
            ("ROOM_INITIAL_OUTGOING_BITRATE".to_string(), "600000".to_string()),
            ("ROOM_MAX_INCOMING_BITRATE".to_string(), "900000".to_string()),
            ("ROOM_SERVICE_ID".to_string(), "room-custom-001".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:4000");
        assert_eq!(config.ws_path, "/webcam");
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.worker_log_level, "debug");
        assert_eq!(config.rtc_min_port, 20000);
        assert_eq!(config.rtc_max_port, 20200);
        assert_eq!(config.announced_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(config.initial_outgoing_bitrate, 600_000);
        assert_eq!(config.max_incoming_bitrate, 900_000);
        assert_eq!(config.service_id, "room-custom-001");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let vars = HashMap::from([("ROOM_NUM_WORKERS".to_string(), "0".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_unparseable_value_rejected() {
        let vars = HashMap::from([("ROOM_RTC_MIN_PORT".to_string(), "ten".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(v)) if v.contains("ROOM_RTC_MIN_PORT")));
    }

    #[test]
    fn test_empty_port_range_rejected() {
        let vars = HashMap::from([
            ("ROOM_RTC_MIN_PORT".to_string(), "30000".to_string()),
            ("ROOM_RTC_MAX_PORT".to_string(), "20000".to_string()),
        ]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_ws_path_must_be_absolute() {
        let vars = HashMap::from([("ROOM_WS_PATH".to_string(), "ws".to_string())]);
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_room_settings_from_config() {
        let vars = HashMap::from([
            ("ROOM_ANNOUNCED_IP".to_string(), "203.0.113.9".to_string()),
            ("ROOM_MAX_INCOMING_BITRATE".to_string(), "0".to_string()),
        ]);
        let config = Config::from_vars(&vars).unwrap();
        let settings = config.room_settings();

        assert_eq!(settings.max_incoming_bitrate, None);
        let listen = settings.transport_options.listen_ips.first().unwrap();
        assert_eq!(listen.announced_ip.as_deref(), Some("203.0.113.9"));
        assert!(settings.transport_options.prefer_udp);
        assert!(!settings.media_codecs.is_empty());

        let worker = config.worker_settings();
        assert_eq!(worker.rtc_min_port, DEFAULT_RTC_MIN_PORT);
    }

    #[test]
    fn test_debug_output_lists_fields() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("rtc_ports"));
        assert!(debug_output.contains("10000-10100"));
    }
}
