//! Queue client abstraction
//!
//! Thin wrapper over a point-to-point message broker with at-least-once
//! delivery. A [`Delivery`] is borrowed from the broker for the duration of
//! handler execution and must be resolved exactly once, to one of the three
//! [`Outcome`]s. Acknowledgment is always explicit; auto-ack would silently
//! drop messages on handler failure and defeat the retry contract.

mod amqp;
mod memory;

pub use amqp::AmqpQueue;
pub use memory::MemoryQueue;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

/// The queues the song service consumes, dispatched by identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    AddSong,
    UpdateSong,
    DeleteSong,
}

impl QueueKind {
    /// Canonical broker queue name
    pub fn queue_name(&self) -> &'static str {
        match self {
            QueueKind::AddSong => "add_song_queue",
            QueueKind::UpdateSong => "update_song_queue",
            QueueKind::DeleteSong => "delete_song_queue",
        }
    }
}

/// Terminal outcome of handling one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Fully processed; remove from the queue
    Ack,
    /// Transient failure; negative-acknowledge with requeue
    Retry,
    /// Permanent failure; reject without requeue
    Discard,
}

/// Broker-specific resolution capability carried by a [`Delivery`]
#[async_trait]
pub trait DeliveryAcker: Send {
    async fn ack(self: Box<Self>) -> Result<()>;
    async fn requeue(self: Box<Self>) -> Result<()>;
    async fn discard(self: Box<Self>) -> Result<()>;
}

/// One message borrowed from the broker
pub struct Delivery {
    payload: Vec<u8>,
    redelivered: bool,
    acker: Box<dyn DeliveryAcker>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, redelivered: bool, acker: Box<dyn DeliveryAcker>) -> Self {
        Self {
            payload,
            redelivered,
            acker,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether the broker has delivered this message before
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// Resolve the delivery; consuming `self` makes double-resolution
    /// unrepresentable.
    pub async fn resolve(self, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Ack => self.acker.ack().await,
            Outcome::Retry => self.acker.requeue().await,
            Outcome::Discard => self.acker.discard().await,
        }
    }
}

/// Point-to-point queue client: publish and subscribe
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Publish a payload onto the named queue
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()>;

    /// Subscribe to the named queue; the receiver yields deliveries until the
    /// subscription ends. One logical consumer per queue.
    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>>;
}
