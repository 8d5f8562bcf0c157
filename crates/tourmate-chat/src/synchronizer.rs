use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tourmate_types::events::FeedFilter;
use tourmate_types::models::{Message, PostSummary, UserSummary};

use crate::conversation::ConversationKey;
use crate::error::{ChatError, Result};
use crate::feed::{ConnectionState, RealtimeFeed, SubscriptionEvent};
use crate::hydrate::{self, HydrationResult, HydrationTicket};
use crate::registry::{Subscription, SubscriptionRegistry, list_channel};
use crate::state::{ChatListSnapshot, ChatListState, ListStatus, MergeOutcome};
use crate::store::{MessageStore, MetadataSource};

/// Returned when a conversation was opened and its unread messages were
/// confirmed checked. Carries what the room view needs to render.
#[derive(Debug, Clone)]
pub struct OpenedConversation {
    pub key: ConversationKey,
    pub counterparty: UserSummary,
    pub post: PostSummary,
    pub thread: Vec<Message>,
    /// Ids whose checked flag this call set.
    pub checked: Vec<i64>,
}

/// Requests handled by a running list between feed events.
pub enum ListCommand {
    Open {
        key: ConversationKey,
        reply: oneshot::Sender<Result<OpenedConversation>>,
    },
    Reload,
}

/// Keeps one viewer's chat list in sync with the store and the realtime feed.
pub struct ChatListSynchronizer<S, M> {
    viewer: Uuid,
    store: Arc<S>,
    meta: Arc<M>,
    state: ChatListState,
}

impl<S, M> ChatListSynchronizer<S, M>
where
    S: MessageStore,
    M: MetadataSource,
{
    pub fn new(viewer: Uuid, store: Arc<S>, meta: Arc<M>) -> Self {
        Self {
            viewer,
            store,
            meta,
            state: ChatListState::new(viewer),
        }
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    pub fn state(&self) -> &ChatListState {
        &self.state
    }

    pub fn snapshot(&self) -> ChatListSnapshot {
        self.state.snapshot()
    }

    /// Fetch every message of the viewer and rebuild the list from it,
    /// including metadata.
    pub async fn load_initial(&mut self) -> Result<Vec<Message>> {
        let (messages, ticket) = self.fetch_all().await?;
        if let Some(ticket) = ticket {
            let result = hydrate::fetch(self.meta.as_ref(), ticket).await;
            self.state.apply_hydration(result);
        }
        Ok(messages)
    }

    /// Merge one pushed insert and fetch whatever metadata its conversation
    /// is missing.
    pub async fn on_realtime_message(&mut self, message: Message) -> MergeOutcome {
        let (outcome, ticket) = self.merge_pushed(message);
        if let Some(ticket) = ticket {
            let result = hydrate::fetch(self.meta.as_ref(), ticket).await;
            self.state.apply_hydration(result);
        }
        outcome
    }

    /// Load the thread and mark everything addressed to the viewer as checked,
    /// in one batch. The list only drops its unread flag once the store
    /// confirmed the update.
    pub async fn open_conversation(&mut self, key: &ConversationKey) -> Result<OpenedConversation> {
        let (a, b) = key.participants();
        let thread = self
            .store
            .thread(key.post_id, a, b)
            .await
            .map_err(ChatError::Fetch)?;

        let unchecked: Vec<i64> = thread
            .iter()
            .filter(|t| t.message.receiver_id == self.viewer && !t.message.is_checked)
            .map(|t| t.message.id)
            .collect();

        let counterparty_id = key.counterparty(self.viewer);
        let counterparty = thread
            .iter()
            .find_map(|t| {
                if t.sender.id == counterparty_id {
                    Some(t.sender.clone())
                } else if t.receiver.id == counterparty_id {
                    Some(t.receiver.clone())
                } else {
                    None
                }
            })
            .or_else(|| self.state.user(counterparty_id).cloned())
            .unwrap_or_else(|| UserSummary::placeholder(counterparty_id));

        if !unchecked.is_empty() {
            if let Err(e) = self.store.mark_checked(&unchecked).await {
                warn!("Failed to mark {} messages checked in {}: {}", unchecked.len(), key, e);
                return Err(ChatError::Update(e));
            }
            self.state.mark_checked(&unchecked);
            debug!("Marked {} messages checked in {}", unchecked.len(), key);
        }

        let thread: Vec<Message> = thread
            .into_iter()
            .map(|t| {
                let mut m = t.message;
                m.is_checked |= unchecked.contains(&m.id);
                m
            })
            .collect();
        for message in &thread {
            self.state.merge_message(message.clone());
        }

        let post = match self.state.post(key.post_id) {
            Some(post) => post.clone(),
            None => self.meta.post(key.post_id).await.unwrap_or_else(|e| {
                warn!("Post metadata {} unavailable: {}", key.post_id, e);
                PostSummary::placeholder(key.post_id)
            }),
        };

        Ok(OpenedConversation {
            key: *key,
            counterparty,
            post,
            thread,
            checked: unchecked,
        })
    }

    /// Drive the list from the realtime feed until `cancel` fires.
    ///
    /// The list channel is subscribed before the first fetch so inserts that
    /// race the load are buffered rather than lost. Every time the feed
    /// reports `Subscribed` the list is refetched, since the feed never
    /// replays what happened while it was down. Metadata fetches run
    /// concurrently; their results are merged here, one at a time.
    pub async fn run<F>(
        &mut self,
        registry: &SubscriptionRegistry,
        feed: Arc<F>,
        updates: watch::Sender<ChatListSnapshot>,
        commands: mpsc::Receiver<ListCommand>,
        cancel: CancellationToken,
    ) where
        F: RealtimeFeed + 'static,
    {
        let subscription = self.subscribe(registry, feed);
        self.run_subscribed(subscription, updates, commands, cancel).await;
    }

    /// Open this viewer's list channel, replacing any earlier one.
    pub fn subscribe<F>(&self, registry: &SubscriptionRegistry, feed: Arc<F>) -> Subscription
    where
        F: RealtimeFeed + 'static,
    {
        registry.subscribe(list_channel(self.viewer), FeedFilter::Participant(self.viewer), feed)
    }

    /// Like [`run`](Self::run), on a subscription the caller already opened.
    pub async fn run_subscribed(
        &mut self,
        mut subscription: Subscription,
        updates: watch::Sender<ChatListSnapshot>,
        mut commands: mpsc::Receiver<ListCommand>,
        cancel: CancellationToken,
    ) {
        let mut in_flight = FuturesUnordered::new();

        updates.send_replace(self.state.snapshot());
        match self.fetch_all().await {
            Ok((_, Some(ticket))) => in_flight.push(fetch_metadata(self.meta.clone(), ticket)),
            Ok((_, None)) => {}
            Err(e) => error!("Initial chat list load failed: {}", e),
        }
        updates.send_replace(self.state.snapshot());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                event = subscription.next_event() => {
                    let Some(event) = event else {
                        if !cancel.is_cancelled() {
                            warn!("Chat list subscription for {} ended", self.viewer);
                        }
                        break;
                    };
                    match event {
                        SubscriptionEvent::State(state) => {
                            let subscribed = state == ConnectionState::Subscribed;
                            self.state.set_connection(state);
                            if subscribed {
                                info!("Reconciling chat list for {}", self.viewer);
                                match self.fetch_all().await {
                                    Ok((_, Some(ticket))) => in_flight.push(fetch_metadata(self.meta.clone(), ticket)),
                                    Ok((_, None)) => {}
                                    Err(e) => warn!("Reconcile failed: {}", e),
                                }
                            }
                        }
                        SubscriptionEvent::Message(message) => {
                            if let (_, Some(ticket)) = self.merge_pushed(message) {
                                in_flight.push(fetch_metadata(self.meta.clone(), ticket));
                            }
                        }
                    }
                }

                Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                    self.state.apply_hydration(result);
                }

                Some(command) = commands.recv() => match command {
                    ListCommand::Open { key, reply } => {
                        let opened = self.open_conversation(&key).await;
                        let _ = reply.send(opened);
                    }
                    ListCommand::Reload => match self.fetch_all().await {
                        Ok((_, Some(ticket))) => in_flight.push(fetch_metadata(self.meta.clone(), ticket)),
                        Ok((_, None)) => {}
                        Err(e) => warn!("Reload failed: {}", e),
                    },
                },
            }
            updates.send_replace(self.state.snapshot());
        }

        subscription.dispose();
        self.state.set_connection(ConnectionState::Closed);
        updates.send_replace(self.state.snapshot());
    }

    async fn fetch_all(&mut self) -> Result<(Vec<Message>, Option<HydrationTicket>)> {
        self.state.begin_load();
        match self.store.messages_for_user(self.viewer).await {
            Ok(messages) => {
                debug!("Fetched {} messages for {}", messages.len(), self.viewer);
                let ticket = self.state.apply_fetch(messages.clone());
                Ok((messages, ticket))
            }
            Err(e) => {
                // Keep showing what we have if an earlier load succeeded.
                if *self.state.status() != ListStatus::Ready {
                    self.state.fail_load(e.to_string());
                }
                Err(ChatError::Fetch(e))
            }
        }
    }

    fn merge_pushed(&mut self, message: Message) -> (MergeOutcome, Option<HydrationTicket>) {
        let id = message.id;
        let outcome = self.state.merge_message(message);
        let ticket = match outcome {
            MergeOutcome::Inserted { key, unread } => {
                debug!("Message {} joined {} (unread: {})", id, key, unread);
                self.state.missing_metadata(&key)
            }
            MergeOutcome::Duplicate => {
                debug!("Ignoring duplicate message {}", id);
                None
            }
            MergeOutcome::Ignored => None,
        };
        (outcome, ticket)
    }
}

async fn fetch_metadata<M: MetadataSource>(meta: Arc<M>, ticket: HydrationTicket) -> HydrationResult {
    hydrate::fetch(meta.as_ref(), ticket).await
}
