use axum::extract::ws::Message;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;

use super::{ClientId, ConnectionRegistry};

/// Why a single recipient did not get a relayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendFailureKind {
    /// The recipient's writer task is gone; its connection is tearing down.
    #[error("connection closed")]
    Closed,

    /// The recipient's outbound queue is full; the message was dropped.
    #[error("outbound queue full")]
    QueueFull,
}

/// A failed delivery to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("send to {recipient} failed: {kind}")]
pub struct SendFailure {
    pub recipient: ClientId,
    pub kind: SendFailureKind,
}

/// Outcome of one broadcast. Failures are collected, never raised.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failures: Vec<SendFailure>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

/// Wire form of a relayed message.
pub fn format_relay_message(sender: &ClientId, text: &str) -> String {
    format!("{}: {}", sender, text)
}

/// Relay `text` from `sender` to every other registered connection.
///
/// Recipients come from a registry snapshot, so the registry lock is not held
/// while enqueueing. A failure for one recipient is logged and recorded, and
/// delivery continues with the rest.
pub fn broadcast(registry: &ConnectionRegistry, text: &str, sender: &ClientId) -> BroadcastReport {
    let recipients = registry.snapshot_excluding(sender);
    let payload = format_relay_message(sender, text);
    let mut report = BroadcastReport::default();

    for recipient in recipients {
        let msg = Message::Text(payload.clone().into());
        match recipient.sender().try_send(msg) {
            Ok(()) => {
                tracing::debug!(
                    sender = %sender,
                    recipient = %recipient.id(),
                    "Relayed message"
                );
                report.delivered += 1;
            }
            Err(err) => {
                let kind = match err {
                    TrySendError::Closed(_) => SendFailureKind::Closed,
                    TrySendError::Full(_) => SendFailureKind::QueueFull,
                };
                tracing::warn!(
                    sender = %sender,
                    recipient = %recipient.id(),
                    error = %kind,
                    "Relay to recipient failed"
                );
                report.failures.push(SendFailure {
                    recipient: recipient.id().clone(),
                    kind,
                });
            }
        }
    }

    report
}
