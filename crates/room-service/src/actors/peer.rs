//! `Peer` - one participant's media resources inside a room.
//!
//! A peer is owned by its room actor and never shared, so it carries no
//! locks. It holds the engine handles for the peer's transports, producers
//! and consumers plus the sending half of the peer's notification outbox.
//!
//! Closing a peer closes every transport it owns; the engine closes the
//! producers and consumers on those transports with them. A closed peer
//! rejects every further call with [`RoomError::DeadPeer`].

use crate::errors::RoomError;
use crate::media::{MediaConsumer, MediaProducer, MediaTransport};

use super::messages::{Notification, PeerInfo, TransportDirection};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Playback state of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Paused,
    Running,
}

pub struct TransportEntry {
    pub transport: Arc<dyn MediaTransport>,
    pub direction: Option<TransportDirection>,
}

pub struct ProducerEntry {
    pub producer: Arc<dyn MediaProducer>,
    pub transport_id: String,
}

pub struct ConsumerEntry {
    pub consumer: Arc<dyn MediaConsumer>,
    pub transport_id: String,
    pub state: ConsumerState,
}

pub struct Peer {
    id: String,
    display_name: String,
    outbox: mpsc::Sender<Notification>,
    transports: HashMap<String, TransportEntry>,
    producers: HashMap<String, ProducerEntry>,
    consumers: HashMap<String, ConsumerEntry>,
    closed: bool,
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("transports", &self.transports.len())
            .field("producers", &self.producers.len())
            .field("consumers", &self.consumers.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Peer {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        outbox: mpsc::Sender<Notification>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            outbox,
            transports: HashMap::new(),
            producers: HashMap::new(),
            consumers: HashMap::new(),
            closed: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), RoomError> {
        if self.closed {
            Err(RoomError::DeadPeer(self.id.clone()))
        } else {
            Ok(())
        }
    }

    /// Register a transport.
    ///
    /// # Errors
    ///
    /// `DeadPeer` after close. `Internal` if the id is already registered;
    /// the duplicate handle is closed and the existing entry kept.
    pub fn add_transport(
        &mut self,
        transport: Arc<dyn MediaTransport>,
        direction: Option<TransportDirection>,
    ) -> Result<(), RoomError> {
        self.ensure_open()?;
        let id = transport.id().to_string();
        if self.transports.contains_key(&id) {
            transport.close();
            return Err(RoomError::Internal(format!(
                "transport {id} already registered"
            )));
        }
        self.transports.insert(
            id,
            TransportEntry {
                transport,
                direction,
            },
        );
        Ok(())
    }

    /// # Errors
    ///
    /// `DeadPeer` after close, `TransportNotFound` for unknown ids.
    pub fn transport(&self, transport_id: &str) -> Result<Arc<dyn MediaTransport>, RoomError> {
        self.ensure_open()?;
        self.transports
            .get(transport_id)
            .map(|entry| Arc::clone(&entry.transport))
            .ok_or_else(|| RoomError::TransportNotFound(transport_id.to_string()))
    }

    /// # Errors
    ///
    /// `DeadPeer` after close, `Internal` on a duplicate id (the duplicate
    /// producer is closed).
    pub fn add_producer(
        &mut self,
        producer: Arc<dyn MediaProducer>,
        transport_id: &str,
    ) -> Result<(), RoomError> {
        self.ensure_open()?;
        let id = producer.id().to_string();
        if self.producers.contains_key(&id) {
            producer.close();
            return Err(RoomError::Internal(format!(
                "producer {id} already registered"
            )));
        }
        self.producers.insert(
            id,
            ProducerEntry {
                producer,
                transport_id: transport_id.to_string(),
            },
        );
        Ok(())
    }

    /// # Errors
    ///
    /// `DeadPeer` after close, `Internal` on a duplicate id (the duplicate
    /// consumer is closed).
    pub fn add_consumer(
        &mut self,
        consumer: Arc<dyn MediaConsumer>,
        transport_id: &str,
        paused: bool,
    ) -> Result<(), RoomError> {
        self.ensure_open()?;
        let id = consumer.id().to_string();
        if self.consumers.contains_key(&id) {
            consumer.close();
            return Err(RoomError::Internal(format!(
                "consumer {id} already registered"
            )));
        }
        let state = if paused {
            ConsumerState::Paused
        } else {
            ConsumerState::Running
        };
        self.consumers.insert(
            id,
            ConsumerEntry {
                consumer,
                transport_id: transport_id.to_string(),
                state,
            },
        );
        Ok(())
    }

    /// # Errors
    ///
    /// `DeadPeer` after close, `ConsumerNotFound` for unknown ids.
    pub fn consumer(&self, consumer_id: &str) -> Result<&ConsumerEntry, RoomError> {
        self.ensure_open()?;
        self.consumers
            .get(consumer_id)
            .ok_or_else(|| RoomError::ConsumerNotFound(consumer_id.to_string()))
    }

    /// # Errors
    ///
    /// `DeadPeer` after close, `ConsumerNotFound` for unknown ids.
    pub fn set_consumer_state(
        &mut self,
        consumer_id: &str,
        state: ConsumerState,
    ) -> Result<(), RoomError> {
        self.ensure_open()?;
        let entry = self
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| RoomError::ConsumerNotFound(consumer_id.to_string()))?;
        entry.state = state;
        Ok(())
    }

    /// # Errors
    ///
    /// `DeadPeer` after close.
    pub fn producer(&self, producer_id: &str) -> Result<Option<&ProducerEntry>, RoomError> {
        self.ensure_open()?;
        Ok(self.producers.get(producer_id))
    }

    /// Drop a producer entry without closing it.
    ///
    /// # Errors
    ///
    /// `DeadPeer` after close.
    pub fn remove_producer(&mut self, producer_id: &str) -> Result<Option<ProducerEntry>, RoomError> {
        self.ensure_open()?;
        Ok(self.producers.remove(producer_id))
    }

    /// Drop a consumer entry without closing it.
    ///
    /// # Errors
    ///
    /// `DeadPeer` after close.
    pub fn remove_consumer(&mut self, consumer_id: &str) -> Result<Option<ConsumerEntry>, RoomError> {
        self.ensure_open()?;
        Ok(self.consumers.remove(consumer_id))
    }

    /// Drop a transport entry together with the producers and consumers that
    /// live on it. The caller closes the returned transport.
    ///
    /// # Errors
    ///
    /// `DeadPeer` after close.
    pub fn remove_transport(
        &mut self,
        transport_id: &str,
    ) -> Result<Option<TransportEntry>, RoomError> {
        self.ensure_open()?;
        let removed = self.transports.remove(transport_id);
        if removed.is_some() {
            self.producers.retain(|_, p| p.transport_id != transport_id);
            self.consumers.retain(|_, c| c.transport_id != transport_id);
        }
        Ok(removed)
    }

    #[must_use]
    pub fn owns_transport(&self, transport_id: &str) -> bool {
        self.transports.contains_key(transport_id)
    }

    #[must_use]
    pub fn owns_producer(&self, producer_id: &str) -> bool {
        self.producers.contains_key(producer_id)
    }

    #[must_use]
    pub fn owns_consumer(&self, consumer_id: &str) -> bool {
        self.consumers.contains_key(consumer_id)
    }

    pub fn producers(&self) -> impl Iterator<Item = &ProducerEntry> {
        self.producers.values()
    }

    #[must_use]
    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Queue a notification without waiting.
    ///
    /// # Errors
    ///
    /// Returns the notification back if the outbox is full or the connection
    /// has gone away.
    pub fn notify(&self, notification: Notification) -> Result<(), TrySendError<Notification>> {
        self.outbox.try_send(notification)
    }

    /// Close every transport (and with them every producer and consumer).
    /// Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for entry in self.transports.values() {
            entry.transport.close();
        }
        self.transports.clear();
        self.producers.clear();
        self.consumers.clear();
    }
}
