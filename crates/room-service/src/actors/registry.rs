//! `RoomRegistryActor` - singleton supervisor for room actors.
//!
//! - Maps room ids to live room actors and is the only place rooms are
//!   created or removed, so concurrent `get_or_create_room` calls for the
//!   same new id always observe one room.
//! - Places each new room on the next worker from the [`WorkerPool`].
//! - Owns the root `CancellationToken`; each room gets a child token.
//! - Monitors room actor health (panic detection via `JoinHandle`).
//!
//! # Removal
//!
//! `remove_if_empty` first asks the room to seal itself. A sealed room
//! rejects joins with `RoomClosing`, which closes the window between the
//! registry deciding a room is empty and a new peer arriving on it; the
//! joining session retries and gets a fresh room.
//!
//! The registry never awaits a room actor. The seal request runs on its own
//! task and posts `RetireIfSealed` back to the mailbox, so a room busy in an
//! engine call does not hold up requests for other rooms. A sealed entry
//! still in the map is replaced by `get_or_create_room`; `RetireIfSealed`
//! only removes the entry if it still holds the actor that was sealed.

use crate::errors::RoomError;
use crate::workers::WorkerPool;

use super::messages::{RegistryMessage, RegistryStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle, RoomSettings};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Time allowed for a removed room actor to release its resources.
const ROOM_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the `RoomRegistryActor`.
#[derive(Clone)]
pub struct RoomRegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RoomRegistryHandle {
    /// Spawn the registry actor and return a handle to it.
    #[must_use]
    pub fn new(
        service_id: String,
        pool: Arc<WorkerPool>,
        settings: Arc<RoomSettings>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomRegistryActor::new(
            service_id,
            receiver,
            sender.downgrade(),
            cancel_token.clone(),
            pool,
            settings,
            metrics,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Return the live room for `room_id`, creating it if needed.
    pub async fn get_or_create_room(&self, room_id: &str) -> Result<RoomActorHandle, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetOrCreateRoom {
                room_id: room_id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    /// Look up an existing room.
    pub async fn get_room(&self, room_id: &str) -> Result<RoomActorHandle, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetRoom {
                room_id: room_id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove the room iff it has no peers. Returns `true` if it was removed.
    pub async fn remove_if_empty(&self, room_id: &str) -> Result<bool, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::RemoveIfEmpty {
                room_id: room_id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn get_status(&self) -> Result<RegistryStatus, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop accepting rooms and shut every room down.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether the registry actor has exited.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Wait for the registry actor to exit.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }
}

struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
    worker_id: String,
    created_at: i64,
}

/// The `RoomRegistryActor` implementation.
pub struct RoomRegistryActor {
    service_id: String,
    receiver: mpsc::Receiver<RegistryMessage>,
    /// For seal tasks posting back; weak so the mailbox still closes when
    /// every handle is gone.
    self_sender: mpsc::WeakSender<RegistryMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    rooms: HashMap<String, ManagedRoom>,
    pool: Arc<WorkerPool>,
    settings: Arc<RoomSettings>,
    accepting_new: bool,
    /// Graceful shutdown deadline, set by `Shutdown`.
    shutdown_deadline: Duration,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomRegistryActor {
    fn new(
        service_id: String,
        receiver: mpsc::Receiver<RegistryMessage>,
        self_sender: mpsc::WeakSender<RegistryMessage>,
        cancel_token: CancellationToken,
        pool: Arc<WorkerPool>,
        settings: Arc<RoomSettings>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Registry, &service_id);

        Self {
            service_id,
            receiver,
            self_sender,
            cancel_token,
            rooms: HashMap::new(),
            pool,
            settings,
            accepting_new: true,
            shutdown_deadline: Duration::from_secs(30),
            metrics,
            mailbox,
        }
    }

    #[instrument(skip_all, name = "room.actor.registry", fields(service_id = %self.service_id))]
    async fn run(mut self) {
        info!(
            target: "room.actor.registry",
            service_id = %self.service_id,
            worker_count = self.pool.worker_count(),
            "RoomRegistryActor started"
        );

        loop {
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "room.actor.registry",
                        service_id = %self.service_id,
                        "RoomRegistryActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
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
                            info!(
                                target: "room.actor.registry",
                                service_id = %self.service_id,
                                "RoomRegistryActor channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "room.actor.registry",
            service_id = %self.service_id,
            messages_processed = self.mailbox.messages_processed(),
            "RoomRegistryActor stopped"
        );
    }

    async fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::GetOrCreateRoom {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_or_create_room(room_id));
            }

            RegistryMessage::GetRoom {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_room(&room_id));
            }

            RegistryMessage::RemoveIfEmpty {
                room_id,
                respond_to,
            } => {
                self.remove_if_empty(room_id, respond_to);
            }

            RegistryMessage::RetireIfSealed {
                room_id,
                room,
                sealed,
                respond_to,
            } => {
                let _ = respond_to.send(self.retire_if_sealed(&room_id, &room, sealed));
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            RegistryMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline);
                let _ = respond_to.send(result);
            }
        }
    }

    fn get_or_create_room(&mut self, room_id: String) -> Result<RoomActorHandle, RoomError> {
        // Sealed for removal; its seal task has not reported back yet.
        if self
            .rooms
            .get(&room_id)
            .is_some_and(|managed| managed.handle.is_sealed())
        {
            if let Some(managed) = self.rooms.remove(&room_id) {
                self.retire_room(&room_id, managed);
            }
        }

        if let Some(managed) = self.rooms.get(&room_id) {
            if !managed.task_handle.is_finished() {
                return Ok(managed.handle.clone());
            }
        }

        if !self.accepting_new {
            return Err(RoomError::Draining);
        }
        if room_id.is_empty() {
            return Err(RoomError::InvalidRequest(
                "Room id must not be empty".to_string(),
            ));
        }

        let worker = self.pool.assign_worker()?;
        let worker_id = worker.id().to_string();

        let (handle, task_handle) = RoomActor::spawn(
            room_id.clone(),
            worker,
            Arc::clone(&self.settings),
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        // A finished entry for this id (crashed room) is replaced here.
        if self
            .rooms
            .insert(
                room_id.clone(),
                ManagedRoom {
                    handle: handle.clone(),
                    task_handle,
                    worker_id: worker_id.clone(),
                    created_at: chrono::Utc::now().timestamp(),
                },
            )
            .is_none()
        {
            self.metrics.room_created();
        }

        info!(
            target: "room.actor.registry",
            service_id = %self.service_id,
            room_id = %room_id,
            worker_id = %worker_id,
            total_rooms = self.rooms.len(),
            "Room actor created"
        );

        Ok(handle)
    }

    fn get_room(&self, room_id: &str) -> Result<RoomActorHandle, RoomError> {
        self.rooms
            .get(room_id)
            .map(|managed| managed.handle.clone())
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))
    }

    /// Start removal: the seal runs off the registry task.
    fn remove_if_empty(
        &self,
        room_id: String,
        respond_to: oneshot::Sender<Result<bool, RoomError>>,
    ) {
        let Some(managed) = self.rooms.get(&room_id) else {
            let _ = respond_to.send(Ok(false));
            return;
        };

        let room = managed.handle.clone();
        let registry = self.self_sender.clone();
        tokio::spawn(async move {
            let sealed = room.seal_if_empty().await;
            // Registry gone: dropping `respond_to` fails the caller.
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let _ = registry
                .send(RegistryMessage::RetireIfSealed {
                    room_id,
                    room,
                    sealed,
                    respond_to,
                })
                .await;
        });
    }

    fn retire_if_sealed(
        &mut self,
        room_id: &str,
        room: &RoomActorHandle,
        sealed: Result<bool, RoomError>,
    ) -> Result<bool, RoomError> {
        match sealed {
            Ok(false) => return Ok(false),
            Ok(true) => {}
            Err(e) => {
                // Actor already gone; drop the stale entry.
                debug!(
                    target: "room.actor.registry",
                    service_id = %self.service_id,
                    room_id = %room_id,
                    error = %e,
                    "Room actor unreachable during removal"
                );
            }
        }

        // The entry may already have been replaced by a fresh room.
        let current = self
            .rooms
            .get(room_id)
            .is_some_and(|managed| managed.handle.same_actor(room));
        if current {
            if let Some(managed) = self.rooms.remove(room_id) {
                self.retire_room(room_id, managed);
            }
        }
        Ok(true)
    }

    /// Cancel a removed room and wait for its cleanup in the background.
    fn retire_room(&self, room_id: &str, managed: ManagedRoom) {
        let ManagedRoom {
            handle,
            task_handle,
            worker_id,
            created_at,
        } = managed;
        handle.cancel();

        let room_id_owned = room_id.to_string();
        let service_id = self.service_id.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(ROOM_CLEANUP_TIMEOUT, task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "room.actor.registry",
                        service_id = %service_id,
                        room_id = %room_id_owned,
                        "Room actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "room.actor.registry",
                        service_id = %service_id,
                        room_id = %room_id_owned,
                        error = ?e,
                        "Room actor task panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "room.actor.registry",
                        service_id = %service_id,
                        room_id = %room_id_owned,
                        "Room actor task cleanup timed out"
                    );
                }
            }
        });

        self.metrics.room_removed();

        info!(
            target: "room.actor.registry",
            service_id = %self.service_id,
            room_id = %room_id,
            worker_id = %worker_id,
            lifetime_secs = chrono::Utc::now().timestamp() - created_at,
            total_rooms = self.rooms.len(),
            "Room actor removed"
        );
    }

    fn get_status(&self) -> RegistryStatus {
        RegistryStatus {
            room_count: self.rooms.len(),
            peer_count: self.metrics.peer_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), RoomError> {
        info!(
            target: "room.actor.registry",
            service_id = %self.service_id,
            room_count = self.rooms.len(),
            deadline_secs = deadline.as_secs(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.shutdown_deadline = deadline;
        self.cancel_token.cancel();

        Ok(())
    }

    async fn graceful_shutdown(&mut self) {
        info!(
            target: "room.actor.registry",
            service_id = %self.service_id,
            room_count = self.rooms.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        let deadline = tokio::time::Instant::now() + self.shutdown_deadline;
        for (room_id, managed) in self.rooms.drain() {
            match tokio::time::timeout_at(deadline, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "room.actor.registry",
                        service_id = %self.service_id,
                        room_id = %room_id,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "room.actor.registry",
                        service_id = %self.service_id,
                        room_id = %room_id,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "room.actor.registry",
                        service_id = %self.service_id,
                        room_id = %room_id,
                        "Room actor shutdown timed out"
                    );
                }
            }
            self.metrics.room_removed();
        }

        info!(
            target: "room.actor.registry",
            service_id = %self.service_id,
            "Graceful shutdown complete"
        );
    }

    /// Drop rooms whose actor task has exited on its own.
    async fn check_room_health(&mut self) {
        let finished: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(room_id, _)| room_id.clone())
            .collect();

        for room_id in finished {
            let Some(managed) = self.rooms.remove(&room_id) else {
                continue;
            };
            warn!(
                target: "room.actor.registry",
                service_id = %self.service_id,
                room_id = %room_id,
                "Room actor task finished unexpectedly"
            );

            if let Err(join_error) = managed.task_handle.await {
                if join_error.is_panic() {
                    error!(
                        target: "room.actor.registry",
                        service_id = %self.service_id,
                        room_id = %room_id,
                        error = ?join_error,
                        "Room actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Room);
                }
            }

            self.metrics.room_removed();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::peer::Peer;
    use crate::media::mock::{MockMediaEngine, MockOperation};
    use crate::media::{default_media_codecs, ListenIp, WebRtcTransportOptions, WorkerSettings};

    async fn registry(workers: usize) -> (RoomRegistryHandle, MockMediaEngine, Arc<WorkerPool>) {
        let engine = MockMediaEngine::new();
        let (handle, pool) = registry_on(&engine, workers).await;
        (handle, engine, pool)
    }

    async fn registry_on(
        engine: &MockMediaEngine,
        workers: usize,
    ) -> (RoomRegistryHandle, Arc<WorkerPool>) {
        let worker_settings = WorkerSettings {
            log_level: "warn".to_string(),
            rtc_min_port: 10000,
            rtc_max_port: 10100,
        };
        let pool = Arc::new(
            WorkerPool::start(engine, &worker_settings, workers)
                .await
                .unwrap(),
        );
        let settings = Arc::new(RoomSettings {
            media_codecs: default_media_codecs(),
            transport_options: WebRtcTransportOptions {
                listen_ips: vec![ListenIp {
                    ip: "127.0.0.1".to_string(),
                    announced_ip: None,
                }],
                enable_udp: true,
                enable_tcp: true,
                prefer_udp: true,
                initial_available_outgoing_bitrate: 1_000_000,
            },
            max_incoming_bitrate: None,
        });
        let handle = RoomRegistryHandle::new(
            "room-test".to_string(),
            Arc::clone(&pool),
            settings,
            ActorMetrics::new(),
        );
        (handle, pool)
    }

    fn peer(id: &str) -> Peer {
        let (tx, _rx) = mpsc::channel(4);
        Peer::new(id, id, tx)
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_room() {
        let (registry, _engine, _pool) = registry(1).await;

        let first = registry.get_or_create_room("r1").await.unwrap();
        let second = registry.get_or_create_room("r1").await.unwrap();
        first.add_peer(peer("alice")).await.unwrap();

        let snapshot = second.snapshot().await.unwrap();
        assert_eq!(snapshot.peers.len(), 1);
        assert_eq!(registry.get_status().await.unwrap().room_count, 1);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_room() {
        let (registry, engine, pool) = registry(2).await;

        let mut tasks = Vec::new();
        for i in 0..10 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let room = registry.get_or_create_room("shared").await.unwrap();
                room.add_peer(peer(&format!("peer-{i}"))).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let room = registry.get_room("shared").await.unwrap();
        assert_eq!(room.snapshot().await.unwrap().peers.len(), 10);
        assert_eq!(registry.get_status().await.unwrap().room_count, 1);

        // Router is created on one worker only.
        room.router_rtp_capabilities().await.unwrap();
        let routers: usize = pool
            .worker_ids()
            .iter()
            .map(|id| engine.router_count(id))
            .sum();
        assert_eq!(routers, 1);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_rooms_spread_across_workers() {
        let (registry, engine, pool) = registry(2).await;

        for room_id in ["a", "b"] {
            let room = registry.get_or_create_room(room_id).await.unwrap();
            room.router_rtp_capabilities().await.unwrap();
        }

        for worker_id in pool.worker_ids() {
            assert_eq!(engine.router_count(&worker_id), 1);
        }

        registry.cancel();
    }

    #[tokio::test]
    async fn test_get_room_not_found() {
        let (registry, _engine, _pool) = registry(1).await;
        let result = registry.get_room("nope").await;
        assert!(matches!(result, Err(RoomError::RoomNotFound(_))));
        registry.cancel();
    }

    #[tokio::test]
    async fn test_remove_if_empty() {
        let (registry, _engine, _pool) = registry(1).await;
        let room = registry.get_or_create_room("r1").await.unwrap();
        room.add_peer(peer("alice")).await.unwrap();

        assert!(!registry.remove_if_empty("r1").await.unwrap());
        assert!(registry.get_room("r1").await.is_ok());

        room.remove_peer("alice").await.unwrap();
        assert!(registry.remove_if_empty("r1").await.unwrap());
        assert!(matches!(
            registry.get_room("r1").await,
            Err(RoomError::RoomNotFound(_))
        ));
        assert!(!registry.remove_if_empty("r1").await.unwrap());

        // Stale handle: room is sealed, joining fails so the caller retries.
        assert!(matches!(
            room.add_peer(peer("bob")).await,
            Err(RoomError::RoomClosing(_))
        ));

        // Same id gets a fresh room.
        let fresh = registry.get_or_create_room("r1").await.unwrap();
        fresh.add_peer(peer("bob")).await.unwrap();

        registry.cancel();
    }

    #[tokio::test]
    async fn test_busy_room_does_not_stall_other_rooms() {
        let engine = MockMediaEngine::builder()
            .delaying(MockOperation::CreateRouter, Duration::from_secs(2))
            .build();
        let (registry, _pool) = registry_on(&engine, 1).await;

        let busy = registry.get_or_create_room("a").await.unwrap();
        busy.add_peer(peer("alice")).await.unwrap();
        busy.add_peer(peer("bob")).await.unwrap();
        busy.remove_peer("alice").await.unwrap();

        // Router creation keeps room "a" busy; removal queues behind it.
        let capabilities = tokio::spawn({
            let busy = busy.clone();
            async move { busy.router_rtp_capabilities().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let removal = tokio::spawn({
            let registry = registry.clone();
            async move { registry.remove_if_empty("a").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let other = tokio::time::timeout(
            Duration::from_millis(500),
            registry.get_or_create_room("b"),
        )
        .await
        .expect("registry should not wait on a busy room")
        .unwrap();
        assert_eq!(other.room_id(), "b");
        assert!(registry.get_room("a").await.unwrap().same_actor(&busy));

        // Bob is still in "a", so it stays.
        assert!(!removal.await.unwrap().unwrap());
        capabilities.await.unwrap().unwrap();
        assert!(registry.get_room("a").await.is_ok());

        registry.cancel();
    }

    #[tokio::test]
    async fn test_sealed_room_is_replaced_on_create() {
        let (registry, _engine, _pool) = registry(1).await;
        let stale = registry.get_or_create_room("r1").await.unwrap();

        // Sealed without going through the registry, as when the seal task
        // has not reported back yet.
        assert!(stale.seal_if_empty().await.unwrap());

        let fresh = registry.get_or_create_room("r1").await.unwrap();
        assert!(!fresh.same_actor(&stale));
        fresh.add_peer(peer("bob")).await.unwrap();
        assert!(stale.is_cancelled());
        assert_eq!(registry.get_status().await.unwrap().room_count, 1);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting_rooms() {
        let (registry, _engine, _pool) = registry(1).await;
        let room = registry.get_or_create_room("r1").await.unwrap();

        registry.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(registry.is_cancelled());

        for _ in 0..50 {
            if registry.is_closed() && room.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(room.is_closed());
        assert!(registry.get_or_create_room("r2").await.is_err());
    }

    #[tokio::test]
    async fn test_faulted_pool_rejects_new_rooms() {
        let (registry, engine, pool) = registry(1).await;
        let existing = registry.get_or_create_room("r1").await.unwrap();

        let worker_id = pool.worker_ids().into_iter().next().unwrap();
        engine.kill_worker(&worker_id);
        tokio::time::timeout(Duration::from_secs(1), pool.fault_token().cancelled())
            .await
            .unwrap();

        let result = registry.get_or_create_room("r2").await;
        assert!(matches!(result, Err(RoomError::WorkerFault(_))));
        // Existing rooms are still reachable.
        assert!(existing.snapshot().await.is_ok());

        registry.cancel();
    }
}
