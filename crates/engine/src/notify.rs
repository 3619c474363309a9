//! Post-commit notification hook.
//!
//! The engine calls [`Notifier::notify`] once per committed transition,
//! after the storage snapshot has committed. A notifier error is logged and
//! dropped; it never undoes the transition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use praxis_storage::TransitionRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub entity_type: String,
    pub entity_id: String,
    pub transition_record_id: String,
    pub action: String,
    pub from_status: String,
    pub to_status: String,
    pub tags: Vec<String>,
}

impl Notification {
    pub fn from_record(record: &TransitionRecord) -> Self {
        Notification {
            entity_type: record.entity_type.clone(),
            entity_id: record.entity_id.clone(),
            transition_record_id: record.id.clone(),
            action: record.action.clone(),
            from_status: record.from_status.clone(),
            to_status: record.to_status.clone(),
            tags: record.side_effects.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification queue is closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Emits one structured log line per notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, n: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            target: "praxis::notify",
            entity_type = %n.entity_type,
            entity_id = %n.entity_id,
            transition = %n.transition_record_id,
            action = %n.action,
            from = %n.from_status,
            to = %n.to_status,
            tags = ?n.tags,
            "transition notification"
        );
        Ok(())
    }
}

/// Pushes notifications onto a bounded queue for a background consumer.
///
/// Enqueueing never waits: a full queue is reported as
/// [`NotifyError::QueueFull`].
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ChannelNotifier { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.tx.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(id: &str) -> Notification {
        Notification {
            entity_type: "Payment".to_string(),
            entity_id: "pay-1".to_string(),
            transition_record_id: id.to_string(),
            action: "refund".to_string(),
            from_status: "COMPLETED".to_string(),
            to_status: "REFUNDED".to_string(),
            tags: vec!["recalculate-balance".to_string()],
        }
    }

    #[tokio::test]
    async fn channel_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::channel(4);
        notifier.notify(notification("t1")).await.unwrap();
        notifier.notify(notification("t2")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().transition_record_id, "t1");
        assert_eq!(rx.recv().await.unwrap().transition_record_id, "t2");
    }

    #[tokio::test]
    async fn full_queue_is_an_error() {
        let (notifier, _rx) = ChannelNotifier::channel(1);
        notifier.notify(notification("t1")).await.unwrap();
        let err = notifier.notify(notification("t2")).await.unwrap_err();
        assert!(matches!(err, NotifyError::QueueFull));
    }

    #[tokio::test]
    async fn closed_queue_is_an_error() {
        let (notifier, rx) = ChannelNotifier::channel(1);
        drop(rx);
        let err = notifier.notify(notification("t1")).await.unwrap_err();
        assert!(matches!(err, NotifyError::Closed));
    }
}
