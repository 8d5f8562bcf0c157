use thiserror::Error;

/// Failure reported by a [`MessageStore`](crate::MessageStore),
/// [`MetadataSource`](crate::MetadataSource) or [`LikeStore`](crate::LikeStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        Self::Backend(format!("{:#}", e))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if status == reqwest::StatusCode::NOT_FOUND => {
                Self::NotFound(e.url().map(|u| u.to_string()).unwrap_or_default())
            }
            _ => Self::Transport(e.to_string()),
        }
    }
}

/// Failure of a realtime feed connection.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("feed fell behind and skipped {0} events")]
    Lagged(u64),

    #[error("feed protocol error: {0}")]
    Protocol(String),
}

/// Errors surfaced to views. Every I/O failure is converted into one of
/// these at the operation boundary.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Initial load, thread fetch or metadata fetch failed. Retry on next mount.
    #[error("fetch failed: {0}")]
    Fetch(#[source] StoreError),

    /// The checked-flag batch update failed; unread state was kept.
    #[error("checked-flag update failed: {0}")]
    Update(#[source] StoreError),

    /// Sending a message failed; nothing was stored.
    #[error("send failed: {0}")]
    Send(#[source] StoreError),

    #[error("message content is empty")]
    EmptyMessage,

    #[error("subscription failed: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("chat list is no longer running")]
    Closed,
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
