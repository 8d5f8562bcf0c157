use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tourmate_types::events::FeedFilter;

use crate::conversation::ConversationKey;
use crate::feed::{ConnectionState, RealtimeFeed, SubscriptionEvent};

/// Events buffered per subscription while the consumer is busy (e.g. during
/// the initial load).
const EVENT_BUFFER: usize = 256;

pub fn list_channel(viewer: Uuid) -> String {
    format!("chat-list-{}", viewer)
}

pub fn room_channel(key: &ConversationKey) -> String {
    format!("chat-room-{}", key)
}

/// Live subscriptions by channel name. At most one per name: subscribing
/// again cancels the previous one.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    entries: Mutex<HashMap<String, ActiveEntry>>,
    parent: CancellationToken,
    reconnect_delay: Duration,
    next_id: AtomicU64,
}

struct ActiveEntry {
    id: u64,
    token: CancellationToken,
}

impl SubscriptionRegistry {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self::with_parent(CancellationToken::new(), reconnect_delay)
    }

    /// Every subscription token is a child of `parent`; cancelling it ends
    /// them all.
    pub fn with_parent(parent: CancellationToken, reconnect_delay: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(HashMap::new()),
                parent,
                reconnect_delay,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open `channel` with `filter` on `feed`, replacing any live subscription
    /// under the same name.
    pub fn subscribe<F>(&self, channel: impl Into<String>, filter: FeedFilter, feed: Arc<F>) -> Subscription
    where
        F: RealtimeFeed + 'static,
    {
        let channel = channel.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.parent.child_token();

        let previous = self.lock_entries().insert(
            channel.clone(),
            ActiveEntry {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!("Replacing subscription on {}", channel);
            previous.token.cancel();
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(run_subscription(
            channel.clone(),
            feed,
            filter,
            tx,
            token.clone(),
            self.inner.reconnect_delay,
        ));

        Subscription {
            disposer: Disposer {
                channel,
                id,
                token,
                registry: self.inner.clone(),
            },
            events: rx,
        }
    }

    pub fn is_active(&self, channel: &str) -> bool {
        self.lock_entries().contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every live subscription.
    pub fn close_all(&self) {
        let drained: Vec<(String, ActiveEntry)> = self.lock_entries().drain().collect();
        for (channel, entry) in drained {
            debug!("Closing subscription on {}", channel);
            entry.token.cancel();
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveEntry>> {
        self.inner.lock_entries()
    }
}

impl RegistryInner {
    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveEntry>> {
        // A panic while holding the lock leaves the map itself intact.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop the entry for `channel` only if it still belongs to `id`.
    fn release(&self, channel: &str, id: u64) {
        let mut entries = self.lock_entries();
        if entries.get(channel).is_some_and(|entry| entry.id == id) {
            entries.remove(channel);
        }
    }
}

/// Handle to one live subscription. Dropping it is the same as [`dispose`](Self::dispose).
pub struct Subscription {
    disposer: Disposer,
    events: mpsc::Receiver<SubscriptionEvent>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.disposer.channel
    }

    /// Next state change or message. `None` once the subscription task has
    /// ended and every buffered event was consumed.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.disposer.token.is_cancelled()
    }

    /// A handle that can end this subscription from elsewhere, e.g. from the
    /// owner of a task that consumes the events.
    pub fn disposer(&self) -> Disposer {
        self.disposer.clone()
    }

    /// Cancel the task and release the channel name if this handle still owns it.
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.disposer.dispose();
    }
}

/// Ends one subscription. Idempotent, and never releases a channel name that
/// a newer subscription has taken over.
#[derive(Clone)]
pub struct Disposer {
    channel: String,
    id: u64,
    token: CancellationToken,
    registry: Arc<RegistryInner>,
}

impl Disposer {
    pub fn dispose(&self) {
        self.token.cancel();
        self.registry.release(&self.channel, self.id);
    }
}

/// Send one event unless cancelled first. False means stop.
async fn emit(tx: &mpsc::Sender<SubscriptionEvent>, token: &CancellationToken, event: SubscriptionEvent) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

async fn run_subscription<F>(
    channel: String,
    feed: Arc<F>,
    filter: FeedFilter,
    tx: mpsc::Sender<SubscriptionEvent>,
    token: CancellationToken,
    reconnect_delay: Duration,
) where
    F: RealtimeFeed + 'static,
{
    'connect: loop {
        if !emit(&tx, &token, SubscriptionEvent::State(ConnectionState::Connecting)).await {
            break;
        }

        let opened = tokio::select! {
            _ = token.cancelled() => break,
            opened = feed.open(filter) => opened,
        };

        match opened {
            Ok(mut stream) => {
                info!("Subscribed to {}", channel);
                if !emit(&tx, &token, SubscriptionEvent::State(ConnectionState::Subscribed)).await {
                    break;
                }

                loop {
                    let item = tokio::select! {
                        _ = token.cancelled() => break 'connect,
                        item = stream.next() => item,
                    };
                    let event = match item {
                        Some(Ok(message)) => SubscriptionEvent::Message(message),
                        Some(Err(e)) => {
                            warn!("Subscription {} failed: {}", channel, e);
                            if !emit(&tx, &token, SubscriptionEvent::State(ConnectionState::Error(e.to_string()))).await {
                                break 'connect;
                            }
                            break;
                        }
                        None => {
                            warn!("Subscription {} stream ended", channel);
                            let reason = "feed closed".to_string();
                            if !emit(&tx, &token, SubscriptionEvent::State(ConnectionState::Error(reason))).await {
                                break 'connect;
                            }
                            break;
                        }
                    };
                    if !emit(&tx, &token, event).await {
                        break 'connect;
                    }
                }
            }
            Err(e) => {
                warn!("Subscription {} could not connect: {}", channel, e);
                if !emit(&tx, &token, SubscriptionEvent::State(ConnectionState::Error(e.to_string()))).await {
                    break;
                }
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
        debug!("Reconnecting {}", channel);
    }

    let _ = tx.try_send(SubscriptionEvent::State(ConnectionState::Closed));
    debug!("Subscription {} closed", channel);
}
