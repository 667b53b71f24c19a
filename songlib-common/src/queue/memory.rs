//! In-process queue backend
//!
//! Mirrors the broker contract closely enough for tests and single-process
//! deployments: durable-until-consumed buffering, explicit resolution, and
//! nack-with-requeue redelivery (marked `redelivered`). Rejected messages are
//! dropped; there is no dead-letter store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use super::{Delivery, DeliveryAcker, QueueClient};
use crate::{Error, Result};

struct QueuedMessage {
    payload: Vec<u8>,
    redelivered: bool,
}

struct QueueState {
    tx: mpsc::UnboundedSender<QueuedMessage>,
    // Taken by the first (only) consumer of the queue.
    rx: Option<mpsc::UnboundedReceiver<QueuedMessage>>,
}

impl QueueState {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

/// In-process [`QueueClient`]
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .entry(queue.to_string())
            .or_insert_with(QueueState::new);
        state
            .tx
            .send(QueuedMessage {
                payload,
                redelivered: false,
            })
            .map_err(|_| Error::Internal(format!("queue '{queue}' is closed")))
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>> {
        let (raw_rx, requeue_tx) = {
            let mut queues = self.queues.lock().await;
            let state = queues
                .entry(queue.to_string())
                .or_insert_with(QueueState::new);
            let rx = state
                .rx
                .take()
                .ok_or_else(|| Error::Internal(format!("queue '{queue}' already has a consumer")))?;
            (rx, state.tx.clone())
        };

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(pump(raw_rx, requeue_tx, tx));
        Ok(rx)
    }
}

async fn pump(
    mut raw_rx: mpsc::UnboundedReceiver<QueuedMessage>,
    requeue_tx: mpsc::UnboundedSender<QueuedMessage>,
    tx: mpsc::Sender<Delivery>,
) {
    while let Some(message) = raw_rx.recv().await {
        let delivery = Delivery::new(
            message.payload.clone(),
            message.redelivered,
            Box::new(MemoryAcker {
                payload: message.payload,
                requeue_tx: requeue_tx.clone(),
            }),
        );
        if tx.send(delivery).await.is_err() {
            // Subscriber went away; stop delivering.
            return;
        }
    }
}

struct MemoryAcker {
    payload: Vec<u8>,
    requeue_tx: mpsc::UnboundedSender<QueuedMessage>,
}

#[async_trait]
impl DeliveryAcker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn requeue(self: Box<Self>) -> Result<()> {
        self.requeue_tx
            .send(QueuedMessage {
                payload: self.payload,
                redelivered: true,
            })
            .map_err(|_| {
                warn!("requeue target queue is closed, message dropped");
                Error::Internal("queue closed during requeue".into())
            })
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
