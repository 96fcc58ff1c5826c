//! WebSocket signaling client for end-to-end tests.
//!
//! Requests are numbered automatically. Notifications that arrive while a
//! response is awaited are buffered and handed out by
//! [`TestSignalingClient::next_notification`] in arrival order.

use crate::fixtures::{compatible_rtp_capabilities, dtls_parameters, rtp_parameters};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Upper bound on any single wait for a frame.
const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestSignalingClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    notifications: VecDeque<Value>,
}

impl TestSignalingClient {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;
        Ok(Self {
            socket,
            next_id: 1,
            notifications: VecDeque::new(),
        })
    }

    /// Send a request and return the full response frame.
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value, anyhow::Error> {
        let id = self.next_id;
        self.next_id += 1;
        self.send_raw(&json!({ "id": id, "method": method, "params": params }).to_string())
            .await?;

        loop {
            let frame = self.next_frame(FRAME_TIMEOUT).await?;
            if frame.get("notification").is_some() {
                self.notifications.push_back(frame);
                continue;
            }
            if frame.get("id").and_then(Value::as_u64) == Some(id) {
                return Ok(frame);
            }
            anyhow::bail!("Unexpected frame while waiting for response {id}: {frame}");
        }
    }

    /// Send a request and return its `result`, failing on an error response.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, anyhow::Error> {
        let response = self.request(method, params).await?;
        if response.get("ok").and_then(Value::as_bool) != Some(true) {
            anyhow::bail!("{method} failed: {response}");
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Send a request expected to fail and return its error code.
    pub async fn call_err(&mut self, method: &str, params: Value) -> Result<String, anyhow::Error> {
        let response = self.request(method, params).await?;
        response
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("{method} unexpectedly succeeded: {response}"))
    }

    /// Send a fire-and-forget request. No response is awaited.
    pub async fn send(&mut self, method: &str, params: Value) -> Result<(), anyhow::Error> {
        self.send_raw(&json!({ "method": method, "params": params }).to_string())
            .await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.socket
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send frame: {}", e))
    }

    /// Next notification, buffered or from the socket.
    pub async fn next_notification(&mut self) -> Result<Value, anyhow::Error> {
        if let Some(notification) = self.notifications.pop_front() {
            return Ok(notification);
        }
        let frame = self.next_frame(FRAME_TIMEOUT).await?;
        if frame.get("notification").is_none() {
            anyhow::bail!("Expected a notification, got: {frame}");
        }
        Ok(frame)
    }

    /// Assert no notification arrives within `wait`.
    pub async fn expect_no_notification(&mut self, wait: Duration) -> Result<(), anyhow::Error> {
        if let Some(notification) = self.notifications.pop_front() {
            anyhow::bail!("Unexpected notification: {notification}");
        }
        match self.next_frame(wait).await {
            Ok(frame) => anyhow::bail!("Unexpected frame: {frame}"),
            Err(_) => Ok(()),
        }
    }

    /// Read the next text frame as JSON.
    pub async fn next_frame(&mut self, wait: Duration) -> Result<Value, anyhow::Error> {
        loop {
            let message = tokio::time::timeout(wait, self.socket.next())
                .await
                .map_err(|_| anyhow::anyhow!("Timed out waiting for frame"))?
                .ok_or_else(|| anyhow::anyhow!("Connection closed"))?
                .map_err(|e| anyhow::anyhow!("WebSocket error: {}", e))?;

            match message {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(_) => anyhow::bail!("Connection closed by server"),
                _ => continue,
            }
        }
    }

    /// Close the connection without leaving the room first.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.socket
            .close(None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close: {}", e))
    }

    // Signaling shortcuts.

    pub async fn join(&mut self, room_id: &str, display_name: &str) -> Result<Value, anyhow::Error> {
        self.call(
            "join",
            json!({ "roomId": room_id, "displayName": display_name }),
        )
        .await
    }

    /// Create and connect a transport. Returns its id.
    pub async fn transport(&mut self, direction: &str) -> Result<String, anyhow::Error> {
        let descriptor = self
            .call("createWebRtcTransport", json!({ "direction": direction }))
            .await?;
        let transport_id = descriptor
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Transport descriptor without id: {descriptor}"))?
            .to_string();
        self.call(
            "connectTransport",
            json!({ "transportId": transport_id, "dtlsParameters": dtls_parameters() }),
        )
        .await?;
        Ok(transport_id)
    }

    /// Produce `kind` on `transport_id`. Returns the producer id.
    pub async fn produce(&mut self, transport_id: &str, kind: &str) -> Result<String, anyhow::Error> {
        let result = self
            .call(
                "produce",
                json!({
                    "transportId": transport_id,
                    "kind": kind,
                    "rtpParameters": rtp_parameters(kind),
                }),
            )
            .await?;
        result
            .get("producerId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("produce result without producerId: {result}"))
    }

    /// Consume `producer_id` with compatible capabilities. Returns the
    /// consumer descriptor.
    pub async fn consume(
        &mut self,
        transport_id: &str,
        producer_id: &str,
    ) -> Result<Value, anyhow::Error> {
        self.call(
            "consume",
            json!({
                "transportId": transport_id,
                "producerId": producer_id,
                "rtpCapabilities": compatible_rtp_capabilities(),
            }),
        )
        .await
    }
}
