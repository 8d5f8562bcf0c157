use std::collections::{HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use tourmate_types::models::{Message, PostSummary, UserSummary};

use crate::conversation::{
    Conversation, ConversationKey, derive_participants_and_posts, group_by_conversation,
    sort_by_latest,
};
use crate::feed::ConnectionState;
use crate::hydrate::{HydrationResult, HydrationTicket, MetadataMiss};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListStatus {
    Loading,
    Ready,
    Failed(String),
}

/// One row of the chat list.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationView {
    pub key: ConversationKey,
    pub post: PostSummary,
    pub counterparty: UserSummary,
    pub last_message: Message,
    pub message_count: usize,
    pub unread: bool,
}

/// What the view renders: load status, feed status and the ordered rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatListSnapshot {
    pub status: ListStatus,
    pub connection: ConnectionState,
    pub conversations: Vec<ConversationView>,
}

impl ChatListSnapshot {
    pub fn loading() -> Self {
        Self {
            status: ListStatus::Loading,
            connection: ConnectionState::Connecting,
            conversations: Vec::new(),
        }
    }

    pub fn unread_count(&self) -> usize {
        self.conversations.iter().filter(|c| c.unread).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New message; `unread` is the conversation's flag after the merge.
    Inserted { key: ConversationKey, unread: bool },
    /// Already cached under this id. Nothing changed apart from a checked flag catching up.
    Duplicate,
    /// The viewer is neither sender nor receiver.
    Ignored,
}

/// The viewer's local message and metadata cache.
///
/// Every mutation is a synchronous merge over the previous state, so two
/// completions that land in the same tick cannot lose each other's writes.
/// Metadata answers carry the generation they were requested under and are
/// dropped once a reload has moved the generation on.
#[derive(Debug)]
pub struct ChatListState {
    viewer: Uuid,
    generation: u64,
    status: ListStatus,
    connection: ConnectionState,
    messages: HashMap<i64, Message>,
    posts: HashMap<Uuid, PostSummary>,
    users: HashMap<Uuid, UserSummary>,
    requested_posts: HashSet<Uuid>,
    requested_users: HashSet<Uuid>,
}

impl ChatListState {
    pub fn new(viewer: Uuid) -> Self {
        Self {
            viewer,
            generation: 0,
            status: ListStatus::Loading,
            connection: ConnectionState::Connecting,
            messages: HashMap::new(),
            posts: HashMap::new(),
            users: HashMap::new(),
            requested_posts: HashSet::new(),
            requested_users: HashSet::new(),
        }
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> &ListStatus {
        &self.status
    }

    pub fn begin_load(&mut self) {
        if self.status != ListStatus::Ready {
            self.status = ListStatus::Loading;
        }
    }

    pub fn fail_load(&mut self, reason: impl Into<String>) {
        self.status = ListStatus::Failed(reason.into());
    }

    pub fn set_connection(&mut self, connection: ConnectionState) {
        self.connection = connection;
    }

    /// Absorb an authoritative fetch of the viewer's messages.
    ///
    /// Starts a new generation: metadata requests still in flight are
    /// forgotten and their answers will be discarded. Returns the metadata
    /// that still has to be fetched for the merged list.
    pub fn apply_fetch(&mut self, messages: Vec<Message>) -> Option<HydrationTicket> {
        self.generation += 1;
        self.requested_posts.clear();
        self.requested_users.clear();

        for message in messages {
            self.merge_message(message);
        }
        self.status = ListStatus::Ready;

        let conversations = self.grouped();
        let ids = derive_participants_and_posts(conversations.values(), self.viewer);
        self.posts.retain(|id, _| ids.post_ids.contains(id));
        self.users.retain(|id, _| ids.user_ids.contains(id));

        self.request(ids.post_ids, ids.user_ids)
    }

    /// Merge one message, deduplicating by id.
    ///
    /// The first copy of an id wins. A later copy can only move `is_checked`
    /// from false to true, so merging the same message twice is the same as
    /// merging it once.
    pub fn merge_message(&mut self, message: Message) -> MergeOutcome {
        if !message.involves(self.viewer) {
            return MergeOutcome::Ignored;
        }

        if let Some(existing) = self.messages.get_mut(&message.id) {
            existing.is_checked |= message.is_checked;
            return MergeOutcome::Duplicate;
        }

        let key = ConversationKey::of(&message);
        self.messages.insert(message.id, message);
        MergeOutcome::Inserted {
            key,
            unread: self.conversation(&key).is_some_and(|c| c.is_unread(self.viewer)),
        }
    }

    /// Metadata still missing for one conversation: at most its post and its
    /// counterparty. `None` when both are cached or already requested.
    pub fn missing_metadata(&mut self, key: &ConversationKey) -> Option<HydrationTicket> {
        let post_ids = HashSet::from([key.post_id]);
        let user_ids = HashSet::from([key.counterparty(self.viewer)]);
        self.request(post_ids, user_ids)
    }

    fn request(&mut self, post_ids: HashSet<Uuid>, user_ids: HashSet<Uuid>) -> Option<HydrationTicket> {
        let post_ids: HashSet<Uuid> = post_ids
            .into_iter()
            .filter(|id| !self.posts.contains_key(id) && self.requested_posts.insert(*id))
            .collect();
        let user_ids: HashSet<Uuid> = user_ids
            .into_iter()
            .filter(|id| !self.users.contains_key(id) && self.requested_users.insert(*id))
            .collect();

        if post_ids.is_empty() && user_ids.is_empty() {
            return None;
        }
        Some(HydrationTicket {
            generation: self.generation,
            post_ids,
            user_ids,
        })
    }

    /// Merge fetched metadata. Returns false if the answer was stale.
    ///
    /// Per id, the last answer wins. Ids no longer referenced by any
    /// conversation are dropped.
    pub fn apply_hydration(&mut self, result: HydrationResult) -> bool {
        if result.generation != self.generation {
            debug!(
                "Dropping metadata from generation {} (now {})",
                result.generation, self.generation
            );
            return false;
        }

        let conversations = self.grouped();
        let referenced = derive_participants_and_posts(conversations.values(), self.viewer);
        let hydrated = result.hydrated;

        for (id, post) in hydrated.posts {
            self.requested_posts.remove(&id);
            if referenced.post_ids.contains(&id) {
                self.posts.insert(id, post);
            }
        }
        for (id, user) in hydrated.users {
            self.requested_users.remove(&id);
            if referenced.user_ids.contains(&id) {
                self.users.insert(id, user);
            }
        }
        // Misses stay marked as requested, so they render as placeholders
        // until the next reload retries them instead of refetching per push.
        for miss in hydrated.misses {
            match miss {
                MetadataMiss::Post(id) => debug!("Post {} will render with a placeholder", id),
                MetadataMiss::User(id) => debug!("User {} will render with a placeholder", id),
            }
        }
        true
    }

    /// Record confirmed checked flags. Only called after the store accepted the update.
    pub fn mark_checked(&mut self, ids: &[i64]) {
        for id in ids {
            if let Some(message) = self.messages.get_mut(id) {
                message.is_checked = true;
            }
        }
    }

    pub fn contains_message(&self, id: i64) -> bool {
        self.messages.contains_key(&id)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn post(&self, id: Uuid) -> Option<&PostSummary> {
        self.posts.get(&id)
    }

    pub fn user(&self, id: Uuid) -> Option<&UserSummary> {
        self.users.get(&id)
    }

    pub fn conversation(&self, key: &ConversationKey) -> Option<Conversation> {
        let mut messages: Vec<Message> = self
            .messages
            .values()
            .filter(|m| ConversationKey::of(m) == *key)
            .cloned()
            .collect();
        if messages.is_empty() {
            return None;
        }
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Some(Conversation { key: *key, messages })
    }

    pub fn is_unread(&self, key: &ConversationKey) -> bool {
        self.conversation(key).is_some_and(|c| c.is_unread(self.viewer))
    }

    /// Conversations with threads in ascending time order.
    fn grouped(&self) -> HashMap<ConversationKey, Conversation> {
        let mut messages: Vec<&Message> = self.messages.values().collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        group_by_conversation(messages)
    }

    /// Conversations ordered most recent first.
    pub fn conversations(&self) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self.grouped().into_values().collect();
        sort_by_latest(&mut list);
        list
    }

    pub fn snapshot(&self) -> ChatListSnapshot {
        let conversations = self
            .conversations()
            .into_iter()
            .filter_map(|conversation| {
                let last_message = conversation.latest()?.clone();
                let counterparty_id = conversation.counterparty(self.viewer);
                Some(ConversationView {
                    key: conversation.key,
                    post: self
                        .posts
                        .get(&conversation.key.post_id)
                        .cloned()
                        .unwrap_or_else(|| PostSummary::placeholder(conversation.key.post_id)),
                    counterparty: self
                        .users
                        .get(&counterparty_id)
                        .cloned()
                        .unwrap_or_else(|| UserSummary::placeholder(counterparty_id)),
                    unread: conversation.is_unread(self.viewer),
                    message_count: conversation.messages.len(),
                    last_message,
                })
            })
            .collect();

        ChatListSnapshot {
            status: self.status.clone(),
            connection: self.connection.clone(),
            conversations,
        }
    }
}
