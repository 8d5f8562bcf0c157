use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shown in place of a post title or user name whose metadata is unavailable.
pub const PLACEHOLDER_NAME: &str = "Default name";

/// Shown in place of a post image or user avatar whose metadata is unavailable.
pub const PLACEHOLDER_IMAGE: &str = "/icons/upload.png";

/// A direct message about a post, exchanged between two users.
///
/// Everything except `is_checked` is immutable once stored. `is_checked`
/// flips to true when the receiver views the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub post_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_checked: bool,
}

impl Message {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// The other participant from `viewer`'s point of view.
    pub fn counterparty(&self, viewer: Uuid) -> Uuid {
        if self.sender_id == viewer {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

/// A thread message with the sender and receiver display fields joined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(flatten)]
    pub message: Message,
    pub sender: UserSummary,
    pub receiver: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: Uuid,
    pub title: String,
    pub image: String,
}

impl PostSummary {
    pub fn placeholder(id: Uuid) -> Self {
        Self {
            id,
            title: PLACEHOLDER_NAME.to_string(),
            image: PLACEHOLDER_IMAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
}

impl UserSummary {
    pub fn placeholder(id: Uuid) -> Self {
        Self {
            id,
            name: PLACEHOLDER_NAME.to_string(),
            avatar: PLACEHOLDER_IMAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}
