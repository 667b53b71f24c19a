//! Consumer manager
//!
//! Owns the queue-to-handler mapping and supervises one worker loop per
//! subscribed queue. Deliveries on one queue are handled concurrently, each on
//! its own task; nothing serializes back-to-back messages beyond the broker's
//! delivery pacing, so handlers must not assume per-queue mutual exclusion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::queue::{Outcome, QueueClient, QueueKind};

/// Business logic invoked per dequeued message
///
/// The returned [`Outcome`] is the handler's only channel back to the broker;
/// the worker loop resolves the delivery with it exactly once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Outcome;
}

type HandlerMap = HashMap<QueueKind, Arc<dyn MessageHandler>>;

/// Supervises one dequeue loop per registered queue
pub struct ConsumerManager {
    queue: Arc<dyn QueueClient>,
    handlers: Arc<RwLock<HandlerMap>>,
    running: Arc<Mutex<HashSet<QueueKind>>>,
}

impl ConsumerManager {
    pub fn new(queue: Arc<dyn QueueClient>) -> Self {
        Self {
            queue,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Record the handler for a queue and start its worker loop immediately
    ///
    /// Re-registering replaces the handler for new deliveries only; in-flight
    /// deliveries finish against the handler they were dequeued with.
    pub async fn register_handler(&self, kind: QueueKind, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().await.insert(kind, handler);
        self.start(kind).await;
    }

    /// Start any registered subscriptions that are not currently running
    ///
    /// Idempotent; used at process startup after all handlers are registered,
    /// and to retry subscriptions that failed to start.
    pub async fn start_consumers(&self) {
        let kinds: Vec<QueueKind> = self.handlers.read().await.keys().copied().collect();
        for kind in kinds {
            self.start(kind).await;
        }
    }

    async fn start(&self, kind: QueueKind) {
        let mut running = self.running.lock().await;
        if running.contains(&kind) {
            return;
        }

        let mut deliveries = match self.queue.consume(kind.queue_name()).await {
            Ok(rx) => rx,
            Err(e) => {
                error!(queue = kind.queue_name(), error = %e, "failed to subscribe");
                return;
            }
        };
        running.insert(kind);
        drop(running);

        let handlers = Arc::clone(&self.handlers);
        let running = Arc::clone(&self.running);
        info!(queue = kind.queue_name(), "consumer started");

        tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                // Snapshot the handler active at dequeue time.
                let handler = handlers.read().await.get(&kind).cloned();
                let Some(handler) = handler else {
                    warn!(queue = kind.queue_name(), "no handler registered, requeueing");
                    if let Err(e) = delivery.resolve(Outcome::Retry).await {
                        error!(queue = kind.queue_name(), error = %e, "requeue failed");
                    }
                    continue;
                };

                tokio::spawn(async move {
                    let outcome = handler.handle(delivery.payload()).await;
                    if let Err(e) = delivery.resolve(outcome).await {
                        error!(
                            queue = kind.queue_name(),
                            ?outcome,
                            error = %e,
                            "failed to resolve delivery"
                        );
                    }
                });
            }
            running.lock().await.remove(&kind);
            info!(queue = kind.queue_name(), "consumer stopped");
        });
    }
}
