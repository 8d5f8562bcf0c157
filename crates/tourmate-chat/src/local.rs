use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use tourmate_db::Database;
use tourmate_gateway::dispatcher::Dispatcher;
use tourmate_types::api::SendMessageRequest;
use tourmate_types::models::{Message, PostSummary, ThreadMessage, UserSummary};

use crate::error::StoreError;
use crate::store::{LikeStore, MessageStore, MetadataSource};

/// Stores backed directly by the database, publishing inserts on an
/// in-process dispatcher. Used when the client runs inside the server
/// process, and in tests.
#[derive(Clone)]
pub struct LocalBackend {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl LocalBackend {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run database work off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Backend(format!("spawn_blocking join error: {}", e)))?
            .map_err(StoreError::from)
    }
}

impl MessageStore for LocalBackend {
    async fn messages_for_user(&self, user_id: Uuid) -> Result<Vec<Message>, StoreError> {
        self.blocking(move |db| {
            db.get_messages_for_user(&user_id.to_string())?
                .into_iter()
                .map(Message::try_from)
                .collect()
        })
        .await
    }

    async fn thread(&self, post_id: Uuid, user_a: Uuid, user_b: Uuid) -> Result<Vec<ThreadMessage>, StoreError> {
        self.blocking(move |db| {
            db.get_thread(&post_id.to_string(), &user_a.to_string(), &user_b.to_string())?
                .into_iter()
                .map(ThreadMessage::try_from)
                .collect()
        })
        .await
    }

    async fn send(&self, request: SendMessageRequest) -> Result<Message, StoreError> {
        let message = self
            .blocking(move |db| {
                let row = db.insert_message(
                    &request.sender_id.to_string(),
                    &request.receiver_id.to_string(),
                    &request.post_id.to_string(),
                    &request.content,
                    Utc::now(),
                )?;
                Message::try_from(row)
            })
            .await?;
        self.dispatcher.publish(message.clone());
        Ok(message)
    }

    async fn mark_checked(&self, ids: &[i64]) -> Result<usize, StoreError> {
        let ids = ids.to_vec();
        self.blocking(move |db| db.mark_messages_checked(&ids)).await
    }
}

impl MetadataSource for LocalBackend {
    async fn post(&self, id: Uuid) -> Result<PostSummary, StoreError> {
        let row = self.blocking(move |db| db.get_post(&id.to_string())).await?;
        let row = row.ok_or_else(|| StoreError::NotFound(format!("post {}", id)))?;
        Ok(PostSummary::try_from(row)?)
    }

    async fn user(&self, id: Uuid) -> Result<UserSummary, StoreError> {
        let row = self.blocking(move |db| db.get_user(&id.to_string())).await?;
        let row = row.ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        Ok(UserSummary::try_from(row)?)
    }
}

impl LikeStore for LocalBackend {
    async fn like_status(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        self.blocking(move |db| db.like_exists(&post_id.to_string(), &user_id.to_string()))
            .await
    }

    async fn set_like(&self, post_id: Uuid, user_id: Uuid, liked: bool) -> Result<(), StoreError> {
        self.blocking(move |db| {
            let (post_id, user_id) = (post_id.to_string(), user_id.to_string());
            if liked {
                db.add_like(&post_id, &user_id)
            } else {
                db.remove_like(&post_id, &user_id)
            }
        })
        .await
    }
}
