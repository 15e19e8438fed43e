use shop_shared::Notification;
use tokio::sync::mpsc;

/// Sending half of the notification side channel. The channel is bounded and
/// never blocks: when the buffer is full `emit` fails right away.
#[derive(Clone)]
pub struct NotificationSink {
    tx: mpsc::Sender<Notification>,
}

pub type NotificationReceiver = mpsc::Receiver<Notification>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification buffer is full")]
    Full,
    #[error("notification channel is closed")]
    Closed,
}

impl NotificationSink {
    /// Creates the channel. The composition root owns both halves and hands
    /// the receiver to whatever relays notifications further.
    pub fn bounded(capacity: usize) -> (Self, NotificationReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn emit(&self, notification: Notification) -> Result<(), NotificationError> {
        self.tx.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotificationError::Full,
            mpsc::error::TrySendError::Closed(_) => NotificationError::Closed,
        })
    }

    /// Fire-and-forget emit for callers on the order paths: a refused
    /// notification is logged and otherwise ignored.
    pub(crate) fn publish(&self, notification: Notification) {
        let kind = notification.kind();
        if let Err(e) = self.emit(notification) {
            tracing::warn!("Dropped {} notification: {}", kind, e);
        }
    }
}
