use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::conversation::ConversationKey;
use crate::error::{ChatError, Result};
use crate::feed::RealtimeFeed;
use crate::registry::{Disposer, SubscriptionRegistry};
use crate::room::ChatRoom;
use crate::state::ChatListSnapshot;
use crate::store::{MessageStore, MetadataSource};
use crate::synchronizer::{ChatListSynchronizer, ListCommand, OpenedConversation};

const COMMAND_BUFFER: usize = 16;

/// Everything one signed-in viewer has running. Ending the session (or
/// dropping it) cancels every subscription it opened.
pub struct ChatSession {
    viewer: Uuid,
    token: CancellationToken,
    registry: SubscriptionRegistry,
}

impl ChatSession {
    pub fn new(viewer: Uuid, reconnect_delay: Duration) -> Self {
        let token = CancellationToken::new();
        let registry = SubscriptionRegistry::with_parent(token.clone(), reconnect_delay);
        Self {
            viewer,
            token,
            registry,
        }
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Start the chat list on its own task.
    pub fn spawn_chat_list<S, M, F>(&self, store: Arc<S>, meta: Arc<M>, feed: Arc<F>) -> ChatListHandle
    where
        S: MessageStore + 'static,
        M: MetadataSource + 'static,
        F: RealtimeFeed + 'static,
    {
        let (updates_tx, updates) = watch::channel(ChatListSnapshot::loading());
        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = self.token.child_token();
        let mut synchronizer = ChatListSynchronizer::new(self.viewer, store, meta);
        let subscription = synchronizer.subscribe(&self.registry, feed);
        let disposer = subscription.disposer();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                synchronizer
                    .run_subscribed(subscription, updates_tx, commands_rx, cancel)
                    .await;
            }
        });

        ChatListHandle {
            updates,
            commands,
            cancel,
            disposer,
            task: Some(task),
        }
    }

    pub fn open_room<S: MessageStore>(&self, key: ConversationKey, store: Arc<S>) -> ChatRoom<S> {
        ChatRoom::new(self.viewer, key, store)
    }

    /// Cancel every subscription but keep the session usable.
    pub fn close_all(&self) {
        self.registry.close_all();
    }

    pub fn end(self) {}
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        info!("Ending chat session for {}", self.viewer);
        self.token.cancel();
        self.registry.close_all();
    }
}

/// A running chat list. Dropping the handle stops the list and releases its
/// realtime subscription right away.
pub struct ChatListHandle {
    updates: watch::Receiver<ChatListSnapshot>,
    commands: mpsc::Sender<ListCommand>,
    cancel: CancellationToken,
    disposer: Disposer,
    task: Option<JoinHandle<()>>,
}

impl ChatListHandle {
    pub fn snapshot(&self) -> ChatListSnapshot {
        self.updates.borrow().clone()
    }

    pub fn updates(&self) -> watch::Receiver<ChatListSnapshot> {
        self.updates.clone()
    }

    /// Open a conversation on the list's task and wait for the result.
    pub async fn open(&self, key: ConversationKey) -> Result<OpenedConversation> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ListCommand::Open { key, reply })
            .await
            .map_err(|_| ChatError::Closed)?;
        response.await.map_err(|_| ChatError::Closed)?
    }

    pub async fn reload(&self) -> Result<()> {
        self.commands
            .send(ListCommand::Reload)
            .await
            .map_err(|_| ChatError::Closed)
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Stop the list and release its subscription. The task winds down on
    /// its own; use [`join`](Self::join) to wait for it.
    pub fn close(&self) {
        self.disposer.dispose();
        self.cancel.cancel();
    }

    /// Wait for the list task to stop, after [`close`](Self::close) or once
    /// its session ended.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ChatListHandle {
    fn drop(&mut self) {
        self.close();
    }
}
