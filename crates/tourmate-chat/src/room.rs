use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use tourmate_types::api::SendMessageRequest;
use tourmate_types::events::FeedFilter;
use tourmate_types::models::{Message, UserSummary};

use crate::conversation::ConversationKey;
use crate::error::{ChatError, Result};
use crate::feed::RealtimeFeed;
use crate::registry::{Subscription, SubscriptionRegistry, room_channel};
use crate::store::MessageStore;

/// The open thread of one conversation, oldest message first.
pub struct ChatRoom<S> {
    viewer: Uuid,
    key: ConversationKey,
    store: Arc<S>,
    messages: Vec<Message>,
    participants: HashMap<Uuid, UserSummary>,
}

impl<S: MessageStore> ChatRoom<S> {
    pub fn new(viewer: Uuid, key: ConversationKey, store: Arc<S>) -> Self {
        Self {
            viewer,
            key,
            store,
            messages: Vec::new(),
            participants: HashMap::new(),
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Display fields for a participant, or the placeholder before the thread is loaded.
    pub fn participant(&self, user_id: Uuid) -> UserSummary {
        self.participants
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserSummary::placeholder(user_id))
    }

    pub async fn load(&mut self) -> Result<&[Message]> {
        let (a, b) = self.key.participants();
        let thread = self
            .store
            .thread(self.key.post_id, a, b)
            .await
            .map_err(ChatError::Fetch)?;

        for entry in thread {
            self.participants.insert(entry.sender.id, entry.sender);
            self.participants.insert(entry.receiver.id, entry.receiver);
            self.apply(entry.message);
        }
        Ok(&self.messages)
    }

    /// Send to the other participant. The stored message is merged right away,
    /// so the realtime echo of it is a duplicate.
    pub async fn send(&mut self, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let request = SendMessageRequest {
            sender_id: self.viewer,
            receiver_id: self.key.counterparty(self.viewer),
            content: content.to_string(),
            post_id: self.key.post_id,
        };
        let message = self.store.send(request).await.map_err(ChatError::Send)?;
        self.apply(message.clone());
        Ok(message)
    }

    /// Merge a message into the thread. False if it belongs elsewhere or is
    /// already present.
    pub fn apply(&mut self, message: Message) -> bool {
        if ConversationKey::of(&message) != self.key {
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!("Room {} already has message {}", self.key, message.id);
            return false;
        }

        let at = self
            .messages
            .partition_point(|m| (m.created_at, m.id) < (message.created_at, message.id));
        self.messages.insert(at, message);
        true
    }

    /// Subscribe this room's channel. Replaces a previous subscription of the same room.
    pub fn subscribe<F>(&self, registry: &SubscriptionRegistry, feed: Arc<F>) -> Subscription
    where
        F: RealtimeFeed + 'static,
    {
        registry.subscribe(room_channel(&self.key), FeedFilter::Post(self.key.post_id), feed)
    }
}
