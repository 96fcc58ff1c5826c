//! Pre-configured test data.

use room_service::config::Config;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Config for a local test server: random port, two workers, loopback
/// transports, unique service id.
pub fn test_config() -> Config {
    test_config_with(&[])
}

/// `test_config` with extra `ROOM_*` overrides.
pub fn test_config_with(overrides: &[(&str, &str)]) -> Config {
    let service_id = format!("room-test-{}", &Uuid::new_v4().to_string()[..8]);
    let mut vars: HashMap<String, String> = [
        ("ROOM_BIND_ADDRESS", "127.0.0.1:0"),
        ("ROOM_NUM_WORKERS", "2"),
        ("ROOM_LISTEN_IP", "127.0.0.1"),
        ("ROOM_SERVICE_ID", service_id.as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (k, v) in overrides {
        vars.insert((*k).to_string(), (*v).to_string());
    }

    Config::from_vars(&vars).expect("test config must be valid")
}

/// Receiver capabilities that can consume audio and video.
pub fn compatible_rtp_capabilities() -> Value {
    json!({
        "codecs": [
            { "kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2 },
            { "kind": "video", "mimeType": "video/VP8", "clockRate": 90000 }
        ],
        "headerExtensions": []
    })
}

/// Receiver capabilities without any video codec.
pub fn audio_only_rtp_capabilities() -> Value {
    json!({
        "codecs": [
            { "kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2 }
        ],
        "headerExtensions": []
    })
}

/// Minimal sender RTP parameters for a producer of `kind`.
pub fn rtp_parameters(kind: &str) -> Value {
    let mime_type = if kind == "video" { "video/VP8" } else { "audio/opus" };
    json!({
        "mid": "0",
        "codecs": [{ "mimeType": mime_type, "payloadType": 100 }],
        "encodings": [{ "ssrc": 1111 }]
    })
}

/// Client DTLS parameters for `connectTransport`.
pub fn dtls_parameters() -> Value {
    json!({
        "role": "client",
        "fingerprints": [{ "algorithm": "sha-256", "value": "AB:CD:EF" }]
    })
}
