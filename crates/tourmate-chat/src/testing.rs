//! In-memory fakes shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use tourmate_types::api::SendMessageRequest;
use tourmate_types::models::{Message, PostSummary, ThreadMessage, UserSummary};

use crate::conversation::ConversationKey;
use crate::error::StoreError;
use crate::store::{LikeStore, MessageStore, MetadataSource};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
}

pub fn message(id: i64, sender: Uuid, receiver: Uuid, post: Uuid, created_at: DateTime<Utc>) -> Message {
    Message {
        id,
        sender_id: sender,
        receiver_id: receiver,
        post_id: post,
        content: format!("message {}", id),
        created_at,
        is_checked: false,
    }
}

#[derive(Default)]
pub struct FakeMetadata {
    posts: Mutex<HashMap<Uuid, PostSummary>>,
    users: Mutex<HashMap<Uuid, UserSummary>>,
    calls: AtomicUsize,
}

impl FakeMetadata {
    pub fn add_post(&self, id: Uuid, title: &str) {
        self.posts.lock().unwrap().insert(
            id,
            PostSummary {
                id,
                title: title.to_string(),
                image: format!("/posts/{}.png", id),
            },
        );
    }

    pub fn add_user(&self, id: Uuid, name: &str) {
        self.users.lock().unwrap().insert(
            id,
            UserSummary {
                id,
                name: name.to_string(),
                avatar: format!("/avatars/{}.png", id),
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataSource for FakeMetadata {
    async fn post(&self, id: Uuid) -> Result<PostSummary, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let found = self.posts.lock().unwrap().get(&id).cloned();
        found.ok_or_else(|| StoreError::NotFound(format!("post {}", id)))
    }

    async fn user(&self, id: Uuid) -> Result<UserSummary, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let found = self.users.lock().unwrap().get(&id).cloned();
        found.ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
    }
}

/// Message store with switchable failures. Records every checked-flag batch.
pub struct FakeStore {
    messages: Mutex<Vec<Message>>,
    next_id: AtomicI64,
    pub fail_load: AtomicBool,
    pub fail_thread: AtomicBool,
    pub fail_mark_checked: AtomicBool,
    pub fail_send: AtomicBool,
    checked_batches: Mutex<Vec<Vec<i64>>>,
    loads: AtomicUsize,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1000),
            fail_load: AtomicBool::new(false),
            fail_thread: AtomicBool::new(false),
            fail_mark_checked: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            checked_batches: Mutex::new(Vec::new()),
            loads: AtomicUsize::new(0),
        }
    }
}

impl FakeStore {
    pub fn with_messages(messages: Vec<Message>) -> Self {
        let store = Self::default();
        *store.messages.lock().unwrap() = messages;
        store
    }

    /// Insert as if another client had written it directly.
    pub fn insert(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn checked_batches(&self) -> Vec<Vec<i64>> {
        self.checked_batches.lock().unwrap().clone()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn is_checked(&self, id: i64) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.id == id && m.is_checked)
    }
}

impl MessageStore for FakeStore {
    async fn messages_for_user(&self, user_id: Uuid) -> Result<Vec<Message>, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection reset".to_string()));
        }
        let messages = self.messages.lock().unwrap();
        Ok(messages.iter().filter(|m| m.involves(user_id)).cloned().collect())
    }

    async fn thread(&self, post_id: Uuid, user_a: Uuid, user_b: Uuid) -> Result<Vec<ThreadMessage>, StoreError> {
        if self.fail_thread.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("timed out".to_string()));
        }
        let key = ConversationKey::new(post_id, user_a, user_b);
        let mut thread: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| ConversationKey::of(m) == key)
            .cloned()
            .collect();
        thread.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(thread
            .into_iter()
            .map(|message| ThreadMessage {
                sender: UserSummary::placeholder(message.sender_id),
                receiver: UserSummary::placeholder(message.receiver_id),
                message,
            })
            .collect())
    }

    async fn send(&self, request: SendMessageRequest) -> Result<Message, StoreError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("insert rejected".to_string()));
        }
        let message = Message {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
            post_id: request.post_id,
            content: request.content,
            created_at: Utc::now(),
            is_checked: false,
        };
        self.insert(message.clone());
        Ok(message)
    }

    async fn mark_checked(&self, ids: &[i64]) -> Result<usize, StoreError> {
        self.checked_batches.lock().unwrap().push(ids.to_vec());
        if self.fail_mark_checked.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection reset".to_string()));
        }
        let mut updated = 0;
        for message in self.messages.lock().unwrap().iter_mut() {
            if ids.contains(&message.id) && !message.is_checked {
                message.is_checked = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[derive(Default)]
pub struct FakeLikeStore {
    liked: Mutex<HashSet<(Uuid, Uuid)>>,
    pub fail: AtomicBool,
}

impl FakeLikeStore {
    pub fn is_liked(&self, post_id: Uuid, user_id: Uuid) -> bool {
        self.liked.lock().unwrap().contains(&(post_id, user_id))
    }
}

impl LikeStore for FakeLikeStore {
    async fn like_status(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("offline".to_string()));
        }
        Ok(self.is_liked(post_id, user_id))
    }

    async fn set_like(&self, post_id: Uuid, user_id: Uuid, liked: bool) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("offline".to_string()));
        }
        let mut set = self.liked.lock().unwrap();
        if liked {
            set.insert((post_id, user_id));
        } else {
            set.remove(&(post_id, user_id));
        }
        Ok(())
    }
}
