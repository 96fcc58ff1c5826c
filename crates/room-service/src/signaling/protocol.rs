//! Signaling wire format.
//!
//! Client frames are JSON text messages:
//!
//! ```text
//! {"id": 7, "method": "produce", "params": {"transportId": "...", "kind": "audio", "rtpParameters": {...}}}
//! ```
//!
//! Every request except `producerClosed` gets exactly one response frame
//! carrying the same `id`:
//!
//! ```text
//! {"id": 7, "ok": true, "result": {"producerId": "..."}}
//! {"id": 7, "ok": false, "error": {"code": "transport-not-found", "message": "Transport not found"}}
//! ```
//!
//! Server-initiated notifications are serialized from
//! [`Notification`](crate::actors::Notification) and carry no `id`.
//!
//! Parameter names are camelCase. The snake_case and legacy names older
//! clients send (`room_id`, `name`, `producerTransportId`, ...) are accepted
//! as aliases.

use crate::actors::TransportDirection;
use crate::errors::RoomError;
use crate::media::MediaKind;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw inbound frame before method dispatch.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl ClientFrame {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the text is not a JSON object with a `method`.
    pub fn parse(text: &str) -> Result<Self, RoomError> {
        serde_json::from_str(text)
            .map_err(|e| RoomError::InvalidRequest(format!("Malformed request: {e}")))
    }
}

/// A validated signaling request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Join {
        room_id: String,
        display_name: String,
    },
    GetRouterRtpCapabilities,
    CreateWebRtcTransport {
        direction: Option<TransportDirection>,
    },
    ConnectTransport {
        transport_id: String,
        dtls_parameters: Value,
    },
    Produce {
        transport_id: String,
        kind: MediaKind,
        rtp_parameters: Value,
    },
    Consume {
        transport_id: String,
        producer_id: String,
        rtp_capabilities: Value,
        paused: bool,
    },
    ResumeConsumer {
        consumer_id: String,
    },
    GetProducers,
    ProducerClosed {
        producer_id: String,
    },
    GetMyRoomInfo,
    ExitRoom,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinParams {
    #[serde(alias = "room_id")]
    room_id: String,
    #[serde(default, alias = "name", alias = "display_name")]
    display_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransportParams {
    #[serde(default)]
    direction: Option<TransportDirection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectTransportParams {
    #[serde(alias = "transport_id")]
    transport_id: String,
    #[serde(alias = "dtls_parameters")]
    dtls_parameters: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProduceParams {
    #[serde(alias = "producerTransportId", alias = "transport_id")]
    transport_id: String,
    kind: MediaKind,
    #[serde(alias = "rtp_parameters")]
    rtp_parameters: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumeParams {
    #[serde(alias = "consumerTransportId", alias = "transport_id")]
    transport_id: String,
    #[serde(alias = "producer_id")]
    producer_id: String,
    #[serde(alias = "rtp_capabilities")]
    rtp_capabilities: Value,
    #[serde(default)]
    paused: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumerIdParams {
    #[serde(alias = "consumer_id")]
    consumer_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProducerIdParams {
    #[serde(alias = "producer_id")]
    producer_id: String,
}

fn params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, RoomError> {
    // Parameterless clients may omit `params` entirely.
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| RoomError::InvalidRequest(format!("Invalid params for {method}: {e}")))
}

impl Request {
    /// Validate `params` for `method`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for unknown methods, missing or mistyped params, and
    /// an empty room id.
    pub fn parse(method: &str, raw: Value) -> Result<Self, RoomError> {
        let request = match method {
            "join" => {
                let p: JoinParams = params(method, raw)?;
                if p.room_id.is_empty() {
                    return Err(RoomError::InvalidRequest(
                        "roomId must not be empty".to_string(),
                    ));
                }
                Request::Join {
                    room_id: p.room_id,
                    display_name: p.display_name,
                }
            }
            "getRouterRtpCapabilities" => Request::GetRouterRtpCapabilities,
            "createWebRtcTransport" => {
                let p: CreateTransportParams = params(method, raw)?;
                Request::CreateWebRtcTransport {
                    direction: p.direction,
                }
            }
            "connectTransport" => {
                let p: ConnectTransportParams = params(method, raw)?;
                Request::ConnectTransport {
                    transport_id: p.transport_id,
                    dtls_parameters: p.dtls_parameters,
                }
            }
            "produce" => {
                let p: ProduceParams = params(method, raw)?;
                Request::Produce {
                    transport_id: p.transport_id,
                    kind: p.kind,
                    rtp_parameters: p.rtp_parameters,
                }
            }
            "consume" => {
                let p: ConsumeParams = params(method, raw)?;
                Request::Consume {
                    transport_id: p.transport_id,
                    producer_id: p.producer_id,
                    rtp_capabilities: p.rtp_capabilities,
                    paused: p.paused,
                }
            }
            "resumeConsumer" => {
                let p: ConsumerIdParams = params(method, raw)?;
                Request::ResumeConsumer {
                    consumer_id: p.consumer_id,
                }
            }
            "getProducers" => Request::GetProducers,
            "producerClosed" => {
                let p: ProducerIdParams = params(method, raw)?;
                Request::ProducerClosed {
                    producer_id: p.producer_id,
                }
            }
            "getMyRoomInfo" => Request::GetMyRoomInfo,
            "exitRoom" => Request::ExitRoom,
            other => {
                return Err(RoomError::InvalidRequest(format!(
                    "Unknown method: {other}"
                )))
            }
        };
        Ok(request)
    }

    /// Method name, also used as the `method` metric label.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Request::Join { .. } => "join",
            Request::GetRouterRtpCapabilities => "getRouterRtpCapabilities",
            Request::CreateWebRtcTransport { .. } => "createWebRtcTransport",
            Request::ConnectTransport { .. } => "connectTransport",
            Request::Produce { .. } => "produce",
            Request::Consume { .. } => "consume",
            Request::ResumeConsumer { .. } => "resumeConsumer",
            Request::GetProducers => "getProducers",
            Request::ProducerClosed { .. } => "producerClosed",
            Request::GetMyRoomInfo => "getMyRoomInfo",
            Request::ExitRoom => "exitRoom",
        }
    }

    /// `producerClosed` is fire-and-forget.
    #[must_use]
    pub const fn expects_response(&self) -> bool {
        !matches!(self, Request::ProducerClosed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Outbound response frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    #[must_use]
    pub fn success(id: Option<u64>, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Option<u64>, error: &RoomError) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(ErrorBody {
                code: error.error_code(),
                message: error.client_message(),
            }),
        }
    }
}
