use std::future::Future;

use uuid::Uuid;

use tourmate_types::api::SendMessageRequest;
use tourmate_types::models::{Message, PostSummary, ThreadMessage, UserSummary};

use crate::error::StoreError;

/// Persistent message storage. Inserts are append-only; the only mutation is
/// the checked flag.
pub trait MessageStore: Send + Sync {
    /// Every message the user sent or received.
    fn messages_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// The thread between two users about a post, either direction, oldest first.
    fn thread(
        &self,
        post_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
    ) -> impl Future<Output = Result<Vec<ThreadMessage>, StoreError>> + Send;

    /// Store a new unchecked message and return it with its assigned id.
    fn send(
        &self,
        request: SendMessageRequest,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send;

    /// Set `is_checked` for all `ids` in one batched update.
    fn mark_checked(&self, ids: &[i64]) -> impl Future<Output = Result<usize, StoreError>> + Send;
}

/// Display metadata for posts and users.
pub trait MetadataSource: Send + Sync {
    fn post(&self, id: Uuid) -> impl Future<Output = Result<PostSummary, StoreError>> + Send;

    fn user(&self, id: Uuid) -> impl Future<Output = Result<UserSummary, StoreError>> + Send;
}

pub trait LikeStore: Send + Sync {
    fn like_status(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn set_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        liked: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
