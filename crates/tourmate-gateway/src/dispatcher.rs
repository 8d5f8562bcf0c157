use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use tourmate_types::models::Message;

const DEFAULT_CAPACITY: usize = 1024;

/// Fans out inserted messages to every realtime subscriber.
///
/// Delivery is in insertion order per receiver. A receiver that falls more
/// than `capacity` messages behind loses the oldest ones and is told how many
/// it skipped; there is no replay.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for inserts. Filtering happens per subscriber.
    broadcast_tx: broadcast::Sender<Message>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to all inserts. Callers apply their own filter.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish a freshly stored message. Returns how many receivers saw it.
    pub fn publish(&self, message: Message) -> usize {
        let id = message.id;
        let receivers = self.inner.broadcast_tx.send(message).unwrap_or(0);
        debug!("Published message {} to {} receivers", id, receivers);
        receivers
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn message(id: i64) -> Message {
        Message {
            id,
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            content: format!("message {}", id),
            created_at: Utc::now(),
            is_checked: false,
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_receiver_in_order() {
        let dispatcher = Dispatcher::new();
        let mut rx1 = dispatcher.subscribe();
        let mut rx2 = dispatcher.subscribe();

        assert_eq!(dispatcher.publish(message(1)), 2);
        dispatcher.publish(message(2));

        assert_eq!(rx1.recv().await.unwrap().id, 1);
        assert_eq!(rx1.recv().await.unwrap().id, 2);
        assert_eq!(rx2.recv().await.unwrap().id, 1);
    }

    #[test]
    fn publish_without_receivers_is_noop() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.publish(message(1)), 0);
    }

    #[tokio::test]
    async fn slow_receiver_is_told_it_lagged() {
        let dispatcher = Dispatcher::with_capacity(2);
        let mut rx = dispatcher.subscribe();

        for id in 1..=4 {
            dispatcher.publish(message(id));
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => assert_eq!(skipped, 2),
            other => panic!("expected lag, got {:?}", other.map(|m| m.id)),
        }
        assert_eq!(rx.recv().await.unwrap().id, 3);
    }
}
