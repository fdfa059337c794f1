//! Named-queue publish/consume.
//!
//! [`AmqpBroker`] talks to RabbitMQ; [`LocalBroker`] keeps queues in process.
//! Both declare a queue on first use by either side, so a message published
//! before any consumer starts is held until one does.

pub mod amqp;

pub use amqp::{AmqpBroker, AmqpConfig};

use bytes::Bytes;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("queue name must not be empty")]
    EmptyQueueName,

    #[error("queue {0:?} is closed")]
    QueueClosed(String),

    #[error("invalid broker config: {0}")]
    InvalidConfig(String),

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}

pub(crate) fn check_queue_name(queue: &str) -> Result<(), BrokerError> {
    if queue.is_empty() {
        return Err(BrokerError::EmptyQueueName);
    }
    Ok(())
}

pub trait MessageBroker {
    /// Enqueue one message on `queue`.
    fn publish(
        &self,
        queue: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Hand every message on `queue` to `handler`, in publish order, until
    /// `cancel` fires.
    fn consume<F>(
        &self,
        queue: &str,
        handler: F,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send
    where
        F: FnMut(Bytes) + Send;
}

#[derive(Debug, Clone)]
struct Queue {
    tx: mpsc::UnboundedSender<Bytes>,
    /// One consumer drains at a time; others wait their turn.
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Bytes>>>,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalBroker {
    queues: Arc<DashMap<String, Queue>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn declare(&self, queue: &str) -> Result<Queue, BrokerError> {
        check_queue_name(queue)?;
        let entry = self.queues.entry(queue.to_string()).or_insert_with(|| {
            tracing::debug!(queue = %queue, "Queue declared");
            Queue::new()
        });
        Ok(entry.value().clone())
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl MessageBroker for LocalBroker {
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<(), BrokerError> {
        let q = self.declare(queue)?;
        let size = payload.len();
        q.tx
            .send(payload)
            .map_err(|_| BrokerError::QueueClosed(queue.to_string()))?;
        tracing::debug!(queue = %queue, bytes = size, "Message published");
        Ok(())
    }

    async fn consume<F>(
        &self,
        queue: &str,
        mut handler: F,
        cancel: CancellationToken,
    ) -> Result<(), BrokerError>
    where
        F: FnMut(Bytes) + Send,
    {
        let q = self.declare(queue)?;
        tracing::info!(queue = %queue, "Waiting for messages");

        let mut rx = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            rx = q.rx.lock() => rx,
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(payload) => handler(payload),
                    None => return Err(BrokerError::QueueClosed(queue.to_string())),
                },
            }
        }

        tracing::info!(queue = %queue, "Consumer stopped");
        Ok(())
    }
}
