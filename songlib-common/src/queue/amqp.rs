//! AMQP queue backend (RabbitMQ via lapin)

use std::collections::HashSet;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    BasicRejectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use super::{Delivery, DeliveryAcker, QueueClient};
use crate::Result;

/// [`QueueClient`] over one AMQP connection and channel
///
/// Queues are declared durable on first use. Consumers run with explicit
/// acknowledgment; resolution maps onto ack / nack-with-requeue /
/// reject-without-requeue.
pub struct AmqpQueue {
    _conn: Connection,
    channel: Channel,
    declared: Mutex<HashSet<String>>,
}

impl AmqpQueue {
    pub async fn connect(url: &str) -> Result<Self> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        info!("connected to AMQP broker");
        Ok(Self {
            _conn: conn,
            channel,
            declared: Mutex::new(HashSet::new()),
        })
    }

    async fn ensure_queue(&self, queue: &str) -> Result<()> {
        let mut declared = self.declared.lock().await;
        if declared.contains(queue) {
            return Ok(());
        }
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        declared.insert(queue.to_string());
        Ok(())
    }
}

#[async_trait]
impl QueueClient for AmqpQueue {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        self.ensure_queue(queue).await?;
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>> {
        self.ensure_queue(queue).await?;
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &format!("songlib-{queue}"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let queue_name = queue.to_string();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut consumer = consumer;
            while let Some(next) = consumer.next().await {
                match next {
                    Ok(delivery) => {
                        let redelivered = delivery.redelivered;
                        let data = delivery.data;
                        let acker = delivery.acker;
                        let delivery =
                            Delivery::new(data, redelivered, Box::new(AmqpAcker { inner: acker }));
                        if tx.send(delivery).await.is_err() {
                            // Subscriber went away; end the pump.
                            return;
                        }
                    }
                    Err(e) => {
                        error!(queue = %queue_name, error = %e, "AMQP consumer stream error");
                    }
                }
            }
            info!(queue = %queue_name, "AMQP consumer stream closed");
        });

        Ok(rx)
    }
}

struct AmqpAcker {
    inner: lapin::acker::Acker,
}

#[async_trait]
impl DeliveryAcker for AmqpAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.inner.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn requeue(self: Box<Self>) -> Result<()> {
        self.inner
            .nack(BasicNackOptions {
                multiple: false,
                requeue: true,
            })
            .await?;
        Ok(())
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        self.inner
            .reject(BasicRejectOptions { requeue: false })
            .await?;
        Ok(())
    }
}
