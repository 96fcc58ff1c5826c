//! In-memory media engine for tests.
//!
//! `MockMediaEngine` keeps every worker, router, transport, producer and
//! consumer in one shared table and reproduces the engine's close cascade:
//!
//! - closing a producer closes its consumers (`ConsumerClosed { ProducerClosed }`)
//! - closing a transport closes its producers (`ProducerClosed`) and consumers
//!   (`ConsumerClosed { TransportClosed }`)
//! - closing a router or worker closes every transport below it
//!
//! Failures and delays can be injected per operation, and DTLS close and
//! worker death can be simulated from the test.
//!
//! # Example
//!
//! ```rust,ignore
//! use room_service::media::mock::{MockMediaEngine, MockOperation};
//!
//! let engine = MockMediaEngine::builder()
//!     .failing(MockOperation::Consume)
//!     .build();
//! ```

use super::{
    ConsumerCloseReason, MediaConsumer, MediaEngine, MediaError, MediaEvent, MediaKind,
    MediaProducer, MediaRouter, MediaTransport, MediaWorker, RtpCodecCapability,
    TransportParameters, WebRtcTransportOptions, WorkerEvent, WorkerSettings,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Engine operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    CreateWorker,
    CreateRouter,
    CreateTransport,
    Connect,
    SetMaxIncomingBitrate,
    Produce,
    Consume,
    Resume,
}

struct WorkerRecord {
    id: String,
    events: mpsc::UnboundedSender<WorkerEvent>,
    alive: bool,
}

struct RouterRecord {
    worker_id: String,
    codecs: Vec<RtpCodecCapability>,
    events: mpsc::UnboundedSender<MediaEvent>,
    closed: bool,
}

struct TransportRecord {
    router_id: String,
    connected: bool,
    max_incoming_bitrate: Option<u32>,
    closed: bool,
}

struct ProducerRecord {
    router_id: String,
    transport_id: String,
    kind: MediaKind,
    rtp_parameters: Value,
    closed: bool,
}

struct ConsumerRecord {
    router_id: String,
    transport_id: String,
    producer_id: String,
    paused: bool,
    closed: bool,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    workers: Vec<WorkerRecord>,
    routers: HashMap<String, RouterRecord>,
    transports: HashMap<String, TransportRecord>,
    producers: HashMap<String, ProducerRecord>,
    consumers: HashMap<String, ConsumerRecord>,
    always_fail: HashSet<MockOperation>,
    fail_next: HashMap<MockOperation, u32>,
    delays: HashMap<MockOperation, Duration>,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn check(&mut self, op: MockOperation) -> Result<(), MediaError> {
        if self.always_fail.contains(&op) {
            return Err(MediaError::Failed(format!("injected failure: {op:?}")));
        }
        if let Some(remaining) = self.fail_next.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MediaError::Failed(format!("injected failure: {op:?}")));
            }
        }
        Ok(())
    }

    fn emit(&self, router_id: &str, event: MediaEvent) {
        if let Some(router) = self.routers.get(router_id) {
            let _ = router.events.send(event);
        }
    }

    fn close_producer(&mut self, producer_id: &str, transport_driven: bool) {
        let router_id = match self.producers.get_mut(producer_id) {
            Some(producer) if !producer.closed => {
                producer.closed = true;
                producer.router_id.clone()
            }
            _ => return,
        };

        if transport_driven {
            self.emit(
                &router_id,
                MediaEvent::ProducerClosed {
                    producer_id: producer_id.to_string(),
                },
            );
        }

        let affected: Vec<String> = self
            .consumers
            .iter()
            .filter(|(_, c)| !c.closed && c.producer_id == producer_id)
            .map(|(id, _)| id.clone())
            .collect();
        for consumer_id in affected {
            self.close_consumer(&consumer_id, Some(ConsumerCloseReason::ProducerClosed));
        }
    }

    fn close_consumer(&mut self, consumer_id: &str, reason: Option<ConsumerCloseReason>) {
        let router_id = match self.consumers.get_mut(consumer_id) {
            Some(consumer) if !consumer.closed => {
                consumer.closed = true;
                consumer.router_id.clone()
            }
            _ => return,
        };

        if let Some(reason) = reason {
            self.emit(
                &router_id,
                MediaEvent::ConsumerClosed {
                    consumer_id: consumer_id.to_string(),
                    reason,
                },
            );
        }
    }

    fn close_transport(&mut self, transport_id: &str) {
        match self.transports.get_mut(transport_id) {
            Some(transport) if !transport.closed => transport.closed = true,
            _ => return,
        }

        let producers: Vec<String> = self
            .producers
            .iter()
            .filter(|(_, p)| !p.closed && p.transport_id == transport_id)
            .map(|(id, _)| id.clone())
            .collect();
        for producer_id in producers {
            self.close_producer(&producer_id, true);
        }

        let consumers: Vec<String> = self
            .consumers
            .iter()
            .filter(|(_, c)| !c.closed && c.transport_id == transport_id)
            .map(|(id, _)| id.clone())
            .collect();
        for consumer_id in consumers {
            self.close_consumer(&consumer_id, Some(ConsumerCloseReason::TransportClosed));
        }
    }

    fn close_router(&mut self, router_id: &str) {
        let transports: Vec<String> = self
            .transports
            .iter()
            .filter(|(_, t)| !t.closed && t.router_id == router_id)
            .map(|(id, _)| id.clone())
            .collect();
        for transport_id in transports {
            self.close_transport(&transport_id);
        }
        if let Some(router) = self.routers.get_mut(router_id) {
            router.closed = true;
        }
    }

    fn close_worker(&mut self, worker_id: &str) {
        let routers: Vec<String> = self
            .routers
            .iter()
            .filter(|(_, r)| !r.closed && r.worker_id == worker_id)
            .map(|(id, _)| id.clone())
            .collect();
        for router_id in routers {
            self.close_router(&router_id);
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sleep for the delay configured for `op`, if any.
async fn stall(inner: &Mutex<Inner>, op: MockOperation) {
    let delay = lock(inner).delays.get(&op).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

/// In-memory media engine.
#[derive(Clone, Default)]
pub struct MockMediaEngine {
    inner: Arc<Mutex<Inner>>,
}

/// Builder for [`MockMediaEngine`].
#[derive(Default)]
pub struct MockMediaEngineBuilder {
    always_fail: HashSet<MockOperation>,
    delays: HashMap<MockOperation, Duration>,
}

impl MockMediaEngineBuilder {
    /// Make every call of `op` fail.
    #[must_use]
    pub fn failing(mut self, op: MockOperation) -> Self {
        self.always_fail.insert(op);
        self
    }

    /// Make every call of `op` take at least `delay`.
    #[must_use]
    pub fn delaying(mut self, op: MockOperation, delay: Duration) -> Self {
        self.delays.insert(op, delay);
        self
    }

    #[must_use]
    pub fn build(self) -> MockMediaEngine {
        let inner = Inner {
            always_fail: self.always_fail,
            delays: self.delays,
            ..Inner::default()
        };
        MockMediaEngine {
            inner: Arc::new(Mutex::new(inner)),
        }
    }
}

impl MockMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> MockMediaEngineBuilder {
        MockMediaEngineBuilder::default()
    }

    /// Make the next call of `op` fail.
    pub fn fail_next(&self, op: MockOperation) {
        *lock(&self.inner).fail_next.entry(op).or_insert(0) += 1;
    }

    /// Simulate the worker process dying. Returns false for unknown ids.
    pub fn kill_worker(&self, worker_id: &str) -> bool {
        let mut inner = lock(&self.inner);
        let Some(worker) = inner.workers.iter_mut().find(|w| w.id == worker_id) else {
            return false;
        };
        worker.alive = false;
        let _ = worker.events.send(WorkerEvent::Died {
            worker_id: worker_id.to_string(),
            reason: "simulated crash".to_string(),
        });
        true
    }

    /// Simulate the transport's DTLS session closing on the remote side.
    ///
    /// Only the `TransportClosed` event is emitted; closing the transport
    /// itself is left to the room.
    pub fn simulate_transport_closed(&self, transport_id: &str) -> bool {
        let inner = lock(&self.inner);
        let Some(transport) = inner.transports.get(transport_id) else {
            return false;
        };
        inner.emit(
            &transport.router_id,
            MediaEvent::TransportClosed {
                transport_id: transport_id.to_string(),
            },
        );
        true
    }

    #[must_use]
    pub fn worker_ids(&self) -> Vec<String> {
        lock(&self.inner)
            .workers
            .iter()
            .map(|w| w.id.clone())
            .collect()
    }

    /// Number of routers ever created on `worker_id`.
    #[must_use]
    pub fn router_count(&self, worker_id: &str) -> usize {
        lock(&self.inner)
            .routers
            .values()
            .filter(|r| r.worker_id == worker_id)
            .count()
    }

    #[must_use]
    pub fn open_transport_count(&self) -> usize {
        lock(&self.inner)
            .transports
            .values()
            .filter(|t| !t.closed)
            .count()
    }

    #[must_use]
    pub fn open_producer_count(&self) -> usize {
        lock(&self.inner)
            .producers
            .values()
            .filter(|p| !p.closed)
            .count()
    }

    #[must_use]
    pub fn open_consumer_count(&self) -> usize {
        lock(&self.inner)
            .consumers
            .values()
            .filter(|c| !c.closed)
            .count()
    }

    #[must_use]
    pub fn is_transport_closed(&self, transport_id: &str) -> Option<bool> {
        lock(&self.inner).transports.get(transport_id).map(|t| t.closed)
    }

    #[must_use]
    pub fn is_transport_connected(&self, transport_id: &str) -> Option<bool> {
        lock(&self.inner)
            .transports
            .get(transport_id)
            .map(|t| t.connected)
    }

    #[must_use]
    pub fn max_incoming_bitrate(&self, transport_id: &str) -> Option<u32> {
        lock(&self.inner)
            .transports
            .get(transport_id)
            .and_then(|t| t.max_incoming_bitrate)
    }

    #[must_use]
    pub fn is_producer_closed(&self, producer_id: &str) -> Option<bool> {
        lock(&self.inner).producers.get(producer_id).map(|p| p.closed)
    }

    #[must_use]
    pub fn is_consumer_closed(&self, consumer_id: &str) -> Option<bool> {
        lock(&self.inner).consumers.get(consumer_id).map(|c| c.closed)
    }

    #[must_use]
    pub fn is_consumer_paused(&self, consumer_id: &str) -> Option<bool> {
        lock(&self.inner).consumers.get(consumer_id).map(|c| c.paused)
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn create_worker(
        &self,
        _settings: &WorkerSettings,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Arc<dyn MediaWorker>, MediaError> {
        let mut inner = lock(&self.inner);
        inner.check(MockOperation::CreateWorker)?;
        let id = inner.next_id("worker");
        inner.workers.push(WorkerRecord {
            id: id.clone(),
            events,
            alive: true,
        });
        Ok(Arc::new(MockWorker {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MockWorker {
    id: String,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl MediaWorker for MockWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_router(
        &self,
        media_codecs: &[RtpCodecCapability],
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Arc<dyn MediaRouter>, MediaError> {
        stall(&self.inner, MockOperation::CreateRouter).await;
        let mut inner = lock(&self.inner);
        let alive = inner
            .workers
            .iter()
            .any(|w| w.id == self.id && w.alive);
        if !alive {
            return Err(MediaError::WorkerDied(self.id.clone()));
        }
        inner.check(MockOperation::CreateRouter)?;
        let id = inner.next_id("router");
        inner.routers.insert(
            id.clone(),
            RouterRecord {
                worker_id: self.id.clone(),
                codecs: media_codecs.to_vec(),
                events,
                closed: false,
            },
        );
        Ok(Arc::new(MockRouter {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn close(&self) {
        lock(&self.inner).close_worker(&self.id);
    }
}

struct MockRouter {
    id: String,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl MediaRouter for MockRouter {
    fn id(&self) -> &str {
        &self.id
    }

    fn rtp_capabilities(&self) -> Value {
        let inner = lock(&self.inner);
        let codecs = inner
            .routers
            .get(&self.id)
            .map(|r| r.codecs.clone())
            .unwrap_or_default();
        json!({ "codecs": codecs, "headerExtensions": [] })
    }

    fn can_consume(&self, producer_id: &str, rtp_capabilities: &Value) -> bool {
        let inner = lock(&self.inner);
        let Some(producer) = inner.producers.get(producer_id) else {
            return false;
        };
        if producer.closed || producer.router_id != self.id {
            return false;
        }
        rtp_capabilities
            .get("codecs")
            .and_then(Value::as_array)
            .is_some_and(|codecs| {
                codecs
                    .iter()
                    .any(|c| c.get("kind").and_then(Value::as_str) == Some(producer.kind.as_str()))
            })
    }

    async fn create_webrtc_transport(
        &self,
        options: &WebRtcTransportOptions,
    ) -> Result<Arc<dyn MediaTransport>, MediaError> {
        stall(&self.inner, MockOperation::CreateTransport).await;
        let mut inner = lock(&self.inner);
        if inner.routers.get(&self.id).map_or(true, |r| r.closed) {
            return Err(MediaError::Closed);
        }
        inner.check(MockOperation::CreateTransport)?;
        let id = inner.next_id("transport");
        inner.transports.insert(
            id.clone(),
            TransportRecord {
                router_id: self.id.clone(),
                connected: false,
                max_incoming_bitrate: None,
                closed: false,
            },
        );

        let protocol = if options.prefer_udp { "udp" } else { "tcp" };
        let candidates: Vec<Value> = options
            .listen_ips
            .iter()
            .map(|l| {
                json!({
                    "foundation": "udpcandidate",
                    "ip": l.announced_ip.clone().unwrap_or_else(|| l.ip.clone()),
                    "port": 40000,
                    "protocol": protocol,
                    "type": "host",
                })
            })
            .collect();
        let parameters = TransportParameters {
            ice_parameters: json!({
                "usernameFragment": format!("ufrag-{id}"),
                "password": format!("pwd-{id}"),
                "iceLite": true,
            }),
            ice_candidates: Value::Array(candidates),
            dtls_parameters: json!({
                "role": "auto",
                "fingerprints": [{ "algorithm": "sha-256", "value": format!("fp-{id}") }],
            }),
        };

        Ok(Arc::new(MockTransport {
            id,
            router_id: self.id.clone(),
            parameters,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn close(&self) {
        lock(&self.inner).close_router(&self.id);
    }
}

struct MockTransport {
    id: String,
    router_id: String,
    parameters: TransportParameters,
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    fn ensure_open(inner: &Inner, id: &str) -> Result<(), MediaError> {
        match inner.transports.get(id) {
            Some(t) if !t.closed => Ok(()),
            _ => Err(MediaError::Closed),
        }
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn parameters(&self) -> TransportParameters {
        self.parameters.clone()
    }

    async fn connect(&self, _dtls_parameters: Value) -> Result<(), MediaError> {
        let mut inner = lock(&self.inner);
        Self::ensure_open(&inner, &self.id)?;
        inner.check(MockOperation::Connect)?;
        if let Some(t) = inner.transports.get_mut(&self.id) {
            t.connected = true;
        }
        Ok(())
    }

    async fn set_max_incoming_bitrate(&self, bitrate: u32) -> Result<(), MediaError> {
        let mut inner = lock(&self.inner);
        Self::ensure_open(&inner, &self.id)?;
        inner.check(MockOperation::SetMaxIncomingBitrate)?;
        if let Some(t) = inner.transports.get_mut(&self.id) {
            t.max_incoming_bitrate = Some(bitrate);
        }
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<Arc<dyn MediaProducer>, MediaError> {
        let mut inner = lock(&self.inner);
        Self::ensure_open(&inner, &self.id)?;
        inner.check(MockOperation::Produce)?;
        let id = inner.next_id("producer");
        inner.producers.insert(
            id.clone(),
            ProducerRecord {
                router_id: self.router_id.clone(),
                transport_id: self.id.clone(),
                kind,
                rtp_parameters,
                closed: false,
            },
        );
        Ok(Arc::new(MockProducer {
            id,
            kind,
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn consume(
        &self,
        producer_id: &str,
        _rtp_capabilities: Value,
        paused: bool,
    ) -> Result<Arc<dyn MediaConsumer>, MediaError> {
        let mut inner = lock(&self.inner);
        Self::ensure_open(&inner, &self.id)?;
        inner.check(MockOperation::Consume)?;
        let (kind, rtp_parameters) = match inner.producers.get(producer_id) {
            Some(p) if !p.closed => (p.kind, p.rtp_parameters.clone()),
            _ => return Err(MediaError::Failed(format!("unknown producer {producer_id}"))),
        };
        let id = inner.next_id("consumer");
        inner.consumers.insert(
            id.clone(),
            ConsumerRecord {
                router_id: self.router_id.clone(),
                transport_id: self.id.clone(),
                producer_id: producer_id.to_string(),
                paused,
                closed: false,
            },
        );
        Ok(Arc::new(MockConsumer {
            id,
            producer_id: producer_id.to_string(),
            kind,
            rtp_parameters,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn close(&self) {
        lock(&self.inner).close_transport(&self.id);
    }
}

struct MockProducer {
    id: String,
    kind: MediaKind,
    inner: Arc<Mutex<Inner>>,
}

impl MediaProducer for MockProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn close(&self) {
        lock(&self.inner).close_producer(&self.id, false);
    }
}

struct MockConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    rtp_parameters: Value,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl MediaConsumer for MockConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    fn producer_id(&self) -> &str {
        &self.producer_id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn rtp_parameters(&self) -> Value {
        self.rtp_parameters.clone()
    }

    fn consumer_type(&self) -> String {
        "simple".to_string()
    }

    fn producer_paused(&self) -> bool {
        false
    }

    async fn resume(&self) -> Result<(), MediaError> {
        let mut inner = lock(&self.inner);
        inner.check(MockOperation::Resume)?;
        match inner.consumers.get_mut(&self.id) {
            Some(c) if !c.closed => {
                c.paused = false;
                Ok(())
            }
            _ => Err(MediaError::Closed),
        }
    }

    fn close(&self) {
        lock(&self.inner).close_consumer(&self.id, None);
    }
}
