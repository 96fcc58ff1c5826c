//! `RoomActor` - one per room.
//!
//! The room actor is the single owner of a room's membership, its lazily
//! created router and every peer's media resources. All mutation happens on
//! the actor task, so a room never needs a lock:
//!
//! - Signaling requests arrive as [`RoomMessage`]s and engine calls are
//!   awaited inside the handler. Messages are processed strictly in order.
//! - Engine lifecycle events ([`MediaEvent`]) arrive on a second channel
//!   and are handled between messages.
//!
//! Notifications to peers are queued with `try_send`; a full or closed
//! outbox drops the notification (logged and counted) and never blocks the
//! room.

use crate::errors::RoomError;
use crate::media::{
    ConsumerCloseReason, MediaEvent, MediaKind, MediaRouter, MediaWorker, RtpCodecCapability,
    WebRtcTransportOptions,
};
use crate::observability::metrics as prom;

use super::messages::{
    ConsumerDescriptor, Notification, ProducerInfo, RoomMessage, RoomSnapshot, RoomState,
    TransportDescriptor, TransportDirection,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::peer::{ConsumerState, Peer};

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Router and transport settings applied to every room.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub media_codecs: Vec<RtpCodecCapability>,
    pub transport_options: WebRtcTransportOptions,
    /// Applied to each new transport; `None` leaves the engine default.
    pub max_incoming_bitrate: Option<u32>,
}

/// Handle to a `RoomActor`.
///
/// Every method fails with [`RoomError::RoomClosing`] once the actor has
/// stopped, so callers can retry against a fresh room.
#[derive(Clone, Debug)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
    sealed: Arc<AtomicBool>,
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomMessage,
    ) -> Result<T, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RoomError::RoomClosing(self.room_id.clone()))?;
        rx.await
            .map_err(|_| RoomError::RoomClosing(self.room_id.clone()))
    }

    /// Add a peer. Returns the room snapshot including the new member.
    pub async fn add_peer(&self, peer: Peer) -> Result<RoomSnapshot, RoomError> {
        self.request(|respond_to| RoomMessage::AddPeer { peer, respond_to })
            .await?
    }

    pub async fn remove_peer(&self, peer_id: &str) -> Result<(), RoomError> {
        let peer_id = peer_id.to_string();
        self.request(|respond_to| RoomMessage::RemovePeer {
            peer_id,
            respond_to,
        })
        .await?
    }

    pub async fn router_rtp_capabilities(&self) -> Result<Value, RoomError> {
        self.request(|respond_to| RoomMessage::GetRouterRtpCapabilities { respond_to })
            .await?
    }

    pub async fn create_transport(
        &self,
        peer_id: &str,
        direction: Option<TransportDirection>,
    ) -> Result<TransportDescriptor, RoomError> {
        let peer_id = peer_id.to_string();
        self.request(|respond_to| RoomMessage::CreateTransport {
            peer_id,
            direction,
            respond_to,
        })
        .await?
    }

    pub async fn connect_transport(
        &self,
        peer_id: &str,
        transport_id: &str,
        dtls_parameters: Value,
    ) -> Result<(), RoomError> {
        let peer_id = peer_id.to_string();
        let transport_id = transport_id.to_string();
        self.request(|respond_to| RoomMessage::ConnectTransport {
            peer_id,
            transport_id,
            dtls_parameters,
            respond_to,
        })
        .await?
    }

    /// Publish a track. Returns the producer id.
    pub async fn produce(
        &self,
        peer_id: &str,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<String, RoomError> {
        let peer_id = peer_id.to_string();
        let transport_id = transport_id.to_string();
        self.request(|respond_to| RoomMessage::Produce {
            peer_id,
            transport_id,
            kind,
            rtp_parameters,
            respond_to,
        })
        .await?
    }

    pub async fn consume(
        &self,
        peer_id: &str,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: Value,
        paused: bool,
    ) -> Result<ConsumerDescriptor, RoomError> {
        let peer_id = peer_id.to_string();
        let transport_id = transport_id.to_string();
        let producer_id = producer_id.to_string();
        self.request(|respond_to| RoomMessage::Consume {
            peer_id,
            transport_id,
            producer_id,
            rtp_capabilities,
            paused,
            respond_to,
        })
        .await?
    }

    pub async fn resume_consumer(&self, peer_id: &str, consumer_id: &str) -> Result<(), RoomError> {
        let peer_id = peer_id.to_string();
        let consumer_id = consumer_id.to_string();
        self.request(|respond_to| RoomMessage::ResumeConsumer {
            peer_id,
            consumer_id,
            respond_to,
        })
        .await?
    }

    pub async fn close_producer(&self, peer_id: &str, producer_id: &str) -> Result<(), RoomError> {
        let peer_id = peer_id.to_string();
        let producer_id = producer_id.to_string();
        self.request(|respond_to| RoomMessage::CloseProducer {
            peer_id,
            producer_id,
            respond_to,
        })
        .await?
    }

    pub async fn list_producers(&self) -> Result<Vec<ProducerInfo>, RoomError> {
        self.request(|respond_to| RoomMessage::ListProducers { respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|respond_to| RoomMessage::GetSnapshot { respond_to })
            .await
    }

    pub async fn get_state(&self) -> Result<RoomState, RoomError> {
        self.request(|respond_to| RoomMessage::GetState { respond_to })
            .await
    }

    /// Seal the room iff it is empty. A sealed room rejects `add_peer`.
    pub async fn seal_if_empty(&self) -> Result<bool, RoomError> {
        self.request(|respond_to| RoomMessage::SealIfEmpty { respond_to })
            .await
    }

    /// Cancel the actor. Peers are closed and the router released.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether the actor has stopped taking messages.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Whether the room has been sealed for removal and rejects joins.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Whether both handles address the same actor.
    #[must_use]
    pub fn same_actor(&self, other: &RoomActorHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    room_id: String,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
    worker: Arc<dyn MediaWorker>,
    settings: Arc<RoomSettings>,
    /// Created on first use.
    router: Option<Arc<dyn MediaRouter>>,
    events_tx: mpsc::UnboundedSender<MediaEvent>,
    events_rx: mpsc::UnboundedReceiver<MediaEvent>,
    peers: HashMap<String, Peer>,
    /// Set once the registry has chosen to remove this room. Shared with
    /// every handle.
    sealed: Arc<AtomicBool>,
    created_at: i64,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Spawn a new room actor on `worker`.
    pub fn spawn(
        room_id: String,
        worker: Arc<dyn MediaWorker>,
        settings: Arc<RoomSettings>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sealed = Arc::new(AtomicBool::new(false));

        let actor = Self {
            room_id: room_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            worker,
            settings,
            router: None,
            events_tx,
            events_rx,
            peers: HashMap::new(),
            sealed: Arc::clone(&sealed),
            created_at: chrono::Utc::now().timestamp(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, &room_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
            sealed,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "room.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "room.actor.room",
            room_id = %self.room_id,
            worker_id = %self.worker.id(),
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "room.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                Some(event) = self.events_rx.recv() => {
                    self.handle_media_event(event);
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_received(self.receiver.len());
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            debug!(
                                target: "room.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.close_all();

        info!(
            target: "room.actor.room",
            room_id = %self.room_id,
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::AddPeer { peer, respond_to } => {
                let _ = respond_to.send(self.add_peer(peer));
            }

            RoomMessage::RemovePeer {
                peer_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.remove_peer(&peer_id));
            }

            RoomMessage::GetRouterRtpCapabilities { respond_to } => {
                let result = self.ensure_router().await.map(|r| r.rtp_capabilities());
                let _ = respond_to.send(result);
            }

            RoomMessage::CreateTransport {
                peer_id,
                direction,
                respond_to,
            } => {
                let result = self.create_transport(&peer_id, direction).await;
                let _ = respond_to.send(result);
            }

            RoomMessage::ConnectTransport {
                peer_id,
                transport_id,
                dtls_parameters,
                respond_to,
            } => {
                let result = self
                    .connect_transport(&peer_id, &transport_id, dtls_parameters)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::Produce {
                peer_id,
                transport_id,
                kind,
                rtp_parameters,
                respond_to,
            } => {
                let result = self
                    .produce(&peer_id, &transport_id, kind, rtp_parameters)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::Consume {
                peer_id,
                transport_id,
                producer_id,
                rtp_capabilities,
                paused,
                respond_to,
            } => {
                let result = self
                    .consume(&peer_id, &transport_id, &producer_id, rtp_capabilities, paused)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomMessage::ResumeConsumer {
                peer_id,
                consumer_id,
                respond_to,
            } => {
                let result = self.resume_consumer(&peer_id, &consumer_id).await;
                let _ = respond_to.send(result);
            }

            RoomMessage::CloseProducer {
                peer_id,
                producer_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.close_producer(&peer_id, &producer_id));
            }

            RoomMessage::ListProducers { respond_to } => {
                let _ = respond_to.send(self.list_producers());
            }

            RoomMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }

            RoomMessage::SealIfEmpty { respond_to } => {
                if self.peers.is_empty() {
                    self.sealed.store(true, Ordering::Release);
                }
                let _ = respond_to.send(self.is_sealed());
            }
        }
    }

    fn add_peer(&mut self, peer: Peer) -> Result<RoomSnapshot, RoomError> {
        if self.is_sealed() {
            return Err(RoomError::RoomClosing(self.room_id.clone()));
        }
        if self.peers.contains_key(peer.id()) {
            return Err(RoomError::Conflict("Peer already in room".to_string()));
        }

        let peer_id = peer.id().to_string();
        self.peers.insert(peer_id.clone(), peer);
        self.metrics.peer_joined();

        info!(
            target: "room.actor.room",
            room_id = %self.room_id,
            peer_id = %peer_id,
            peer_count = self.peers.len(),
            "Peer joined"
        );

        Ok(self.snapshot())
    }

    fn remove_peer(&mut self, peer_id: &str) -> Result<(), RoomError> {
        let mut peer = self
            .peers
            .remove(peer_id)
            .ok_or_else(|| RoomError::PeerNotFound(peer_id.to_string()))?;

        // Engine emits ConsumerClosed for other peers' subscriptions.
        peer.close();
        self.metrics.peer_left();

        info!(
            target: "room.actor.room",
            room_id = %self.room_id,
            peer_id = %peer_id,
            peer_count = self.peers.len(),
            "Peer left"
        );

        Ok(())
    }

    async fn ensure_router(&mut self) -> Result<Arc<dyn MediaRouter>, RoomError> {
        if let Some(router) = &self.router {
            return Ok(Arc::clone(router));
        }

        let router = self
            .worker
            .create_router(&self.settings.media_codecs, self.events_tx.clone())
            .await?;

        info!(
            target: "room.actor.room",
            room_id = %self.room_id,
            router_id = %router.id(),
            worker_id = %self.worker.id(),
            "Router created"
        );

        self.router = Some(Arc::clone(&router));
        Ok(router)
    }

    fn peer(&self, peer_id: &str) -> Result<&Peer, RoomError> {
        self.peers
            .get(peer_id)
            .ok_or_else(|| RoomError::PeerNotFound(peer_id.to_string()))
    }

    fn peer_mut(&mut self, peer_id: &str) -> Result<&mut Peer, RoomError> {
        self.peers
            .get_mut(peer_id)
            .ok_or_else(|| RoomError::PeerNotFound(peer_id.to_string()))
    }

    async fn create_transport(
        &mut self,
        peer_id: &str,
        direction: Option<TransportDirection>,
    ) -> Result<TransportDescriptor, RoomError> {
        self.peer(peer_id)?;
        let router = self.ensure_router().await?;
        let transport = router
            .create_webrtc_transport(&self.settings.transport_options)
            .await?;

        if let Some(bitrate) = self.settings.max_incoming_bitrate {
            if let Err(e) = transport.set_max_incoming_bitrate(bitrate).await {
                warn!(
                    target: "room.actor.room",
                    room_id = %self.room_id,
                    transport_id = %transport.id(),
                    error = %e,
                    "Failed to apply max incoming bitrate"
                );
            }
        }

        let parameters = transport.parameters();
        let descriptor = TransportDescriptor {
            id: transport.id().to_string(),
            ice_parameters: parameters.ice_parameters,
            ice_candidates: parameters.ice_candidates,
            dtls_parameters: parameters.dtls_parameters,
        };

        match self.peers.get_mut(peer_id) {
            Some(peer) => peer.add_transport(transport, direction)?,
            None => {
                transport.close();
                return Err(RoomError::PeerNotFound(peer_id.to_string()));
            }
        }

        debug!(
            target: "room.actor.room",
            room_id = %self.room_id,
            peer_id = %peer_id,
            transport_id = %descriptor.id,
            direction = ?direction,
            "Transport created"
        );

        Ok(descriptor)
    }

    async fn connect_transport(
        &mut self,
        peer_id: &str,
        transport_id: &str,
        dtls_parameters: Value,
    ) -> Result<(), RoomError> {
        let transport = self.peer(peer_id)?.transport(transport_id)?;
        transport.connect(dtls_parameters).await?;

        debug!(
            target: "room.actor.room",
            room_id = %self.room_id,
            peer_id = %peer_id,
            transport_id = %transport_id,
            "Transport connected"
        );

        Ok(())
    }

    async fn produce(
        &mut self,
        peer_id: &str,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<String, RoomError> {
        let transport = self.peer(peer_id)?.transport(transport_id)?;
        let producer = transport.produce(kind, rtp_parameters).await?;
        let producer_id = producer.id().to_string();

        match self.peers.get_mut(peer_id) {
            Some(peer) => peer.add_producer(producer, transport_id)?,
            None => {
                producer.close();
                return Err(RoomError::PeerNotFound(peer_id.to_string()));
            }
        }

        info!(
            target: "room.actor.room",
            room_id = %self.room_id,
            peer_id = %peer_id,
            producer_id = %producer_id,
            kind = %kind,
            "Producer created"
        );

        self.broadcast_except(
            peer_id,
            &Notification::NewProducers {
                producers: vec![ProducerInfo {
                    producer_id: producer_id.clone(),
                    owner_peer_id: peer_id.to_string(),
                    kind,
                }],
            },
        );

        Ok(producer_id)
    }

    async fn consume(
        &mut self,
        peer_id: &str,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: Value,
        paused: bool,
    ) -> Result<ConsumerDescriptor, RoomError> {
        let transport = self.peer(peer_id)?.transport(transport_id)?;

        if !self.peers.values().any(|p| p.owns_producer(producer_id)) {
            return Err(RoomError::ProducerNotFound(producer_id.to_string()));
        }
        let router = self
            .router
            .clone()
            .ok_or_else(|| RoomError::ProducerNotFound(producer_id.to_string()))?;
        if !router.can_consume(producer_id, &rtp_capabilities) {
            return Err(RoomError::CapabilityMismatch(producer_id.to_string()));
        }

        let consumer = transport
            .consume(producer_id, rtp_capabilities, paused)
            .await?;

        let descriptor = ConsumerDescriptor {
            id: consumer.id().to_string(),
            producer_id: producer_id.to_string(),
            kind: consumer.kind(),
            rtp_parameters: consumer.rtp_parameters(),
            consumer_type: consumer.consumer_type(),
            producer_paused: consumer.producer_paused(),
            paused,
        };

        match self.peers.get_mut(peer_id) {
            Some(peer) => peer.add_consumer(consumer, transport_id, paused)?,
            None => {
                consumer.close();
                return Err(RoomError::PeerNotFound(peer_id.to_string()));
            }
        }

        debug!(
            target: "room.actor.room",
            room_id = %self.room_id,
            peer_id = %peer_id,
            consumer_id = %descriptor.id,
            producer_id = %producer_id,
            paused = paused,
            "Consumer created"
        );

        Ok(descriptor)
    }

    async fn resume_consumer(&mut self, peer_id: &str, consumer_id: &str) -> Result<(), RoomError> {
        let entry = self.peer(peer_id)?.consumer(consumer_id)?;
        if entry.state == ConsumerState::Running {
            return Ok(());
        }
        let consumer = Arc::clone(&entry.consumer);

        consumer.resume().await?;
        self.peer_mut(peer_id)?
            .set_consumer_state(consumer_id, ConsumerState::Running)?;

        debug!(
            target: "room.actor.room",
            room_id = %self.room_id,
            peer_id = %peer_id,
            consumer_id = %consumer_id,
            "Consumer resumed"
        );

        Ok(())
    }

    fn close_producer(&mut self, peer_id: &str, producer_id: &str) -> Result<(), RoomError> {
        let room_id = self.room_id.clone();
        let peer = self.peer_mut(peer_id)?;

        match peer.remove_producer(producer_id)? {
            Some(entry) => {
                // Consumers of this producer close with it.
                entry.producer.close();
                info!(
                    target: "room.actor.room",
                    room_id = %room_id,
                    peer_id = %peer_id,
                    producer_id = %producer_id,
                    "Producer closed"
                );
            }
            None => {
                debug!(
                    target: "room.actor.room",
                    room_id = %room_id,
                    peer_id = %peer_id,
                    producer_id = %producer_id,
                    "Producer already closed"
                );
            }
        }

        Ok(())
    }

    fn list_producers(&self) -> Vec<ProducerInfo> {
        let mut producers: Vec<ProducerInfo> = self
            .peers
            .values()
            .flat_map(|peer| {
                peer.producers().map(move |entry| ProducerInfo {
                    producer_id: entry.producer.id().to_string(),
                    owner_peer_id: peer.id().to_string(),
                    kind: entry.producer.kind(),
                })
            })
            .collect();
        producers.sort_by(|a, b| a.producer_id.cmp(&b.producer_id));
        producers
    }

    fn snapshot(&self) -> RoomSnapshot {
        let mut peers: Vec<_> = self.peers.values().map(Peer::info).collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        RoomSnapshot {
            id: self.room_id.clone(),
            peers,
        }
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn state(&self) -> RoomState {
        RoomState {
            room_id: self.room_id.clone(),
            peer_count: self.peers.len(),
            transport_count: self.peers.values().map(Peer::transport_count).sum(),
            producer_count: self.peers.values().map(Peer::producer_count).sum(),
            consumer_count: self.peers.values().map(Peer::consumer_count).sum(),
            router_created: self.router.is_some(),
            is_sealed: self.is_sealed(),
            created_at: self.created_at,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    fn broadcast_except(&self, except_peer_id: &str, notification: &Notification) {
        for (peer_id, peer) in &self.peers {
            if peer_id == except_peer_id {
                continue;
            }
            deliver(&self.room_id, peer, notification.clone());
        }
    }

    fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::TransportClosed { transport_id } => {
                let Some(peer) = self
                    .peers
                    .values_mut()
                    .find(|p| p.owns_transport(&transport_id))
                else {
                    return;
                };
                if let Ok(Some(entry)) = peer.remove_transport(&transport_id) {
                    entry.transport.close();
                    info!(
                        target: "room.actor.room",
                        room_id = %self.room_id,
                        peer_id = %peer.id(),
                        transport_id = %transport_id,
                        "Transport closed by engine"
                    );
                }
            }

            MediaEvent::ProducerClosed { producer_id } => {
                if let Some(peer) = self
                    .peers
                    .values_mut()
                    .find(|p| p.owns_producer(&producer_id))
                {
                    let _ = peer.remove_producer(&producer_id);
                    debug!(
                        target: "room.actor.room",
                        room_id = %self.room_id,
                        peer_id = %peer.id(),
                        producer_id = %producer_id,
                        "Producer closed with its transport"
                    );
                }
            }

            MediaEvent::ConsumerClosed {
                consumer_id,
                reason,
            } => {
                let Some(peer) = self
                    .peers
                    .values_mut()
                    .find(|p| p.owns_consumer(&consumer_id))
                else {
                    return;
                };
                if reason == ConsumerCloseReason::ProducerClosed {
                    deliver(
                        &self.room_id,
                        peer,
                        Notification::ConsumerClosed {
                            consumer_id: consumer_id.clone(),
                        },
                    );
                }
                if let Ok(Some(entry)) = peer.remove_consumer(&consumer_id) {
                    entry.consumer.close();
                }
                debug!(
                    target: "room.actor.room",
                    room_id = %self.room_id,
                    peer_id = %peer.id(),
                    consumer_id = %consumer_id,
                    reason = ?reason,
                    "Consumer closed by engine"
                );
            }
        }
    }

    /// Close every peer and release the router.
    fn close_all(&mut self) {
        for peer in self.peers.values_mut() {
            peer.close();
            self.metrics.peer_left();
        }
        let peers_closed = self.peers.len();
        self.peers.clear();

        if let Some(router) = self.router.take() {
            router.close();
        }

        debug!(
            target: "room.actor.room",
            room_id = %self.room_id,
            peers_closed = peers_closed,
            "Room resources released"
        );
    }
}

fn deliver(room_id: &str, peer: &Peer, notification: Notification) {
    let kind = notification.kind();
    if let Err(e) = peer.notify(notification) {
        let reason = match e {
            TrySendError::Full(_) => "outbox_full",
            TrySendError::Closed(_) => "connection_closed",
        };
        warn!(
            target: "room.actor.room",
            room_id = %room_id,
            peer_id = %peer.id(),
            notification = kind,
            reason = reason,
            "Notification dropped"
        );
        prom::record_notification_dropped(kind);
    }
}
