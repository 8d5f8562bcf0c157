//! Client-side chat synchronization for the tour marketplace.
//!
//! The [`ChatListSynchronizer`] keeps a grouped, live view of a viewer's
//! conversations: an initial bulk fetch from a [`MessageStore`], incremental
//! inserts from a [`RealtimeFeed`] subscription, metadata from a
//! [`MetadataSource`], and per-conversation unread state.

pub mod config;
pub mod conversation;
pub mod error;
pub mod feed;
pub mod hydrate;
pub mod likes;
pub mod local;
pub mod registry;
pub mod remote;
pub mod room;
pub mod session;
pub mod state;
pub mod store;
pub mod synchronizer;

#[cfg(test)]
mod testing;

pub use config::ClientConfig;
pub use conversation::{
    Conversation, ConversationKey, ParticipantIds, derive_participants_and_posts,
    group_by_conversation, sort_by_latest,
};
pub use error::{ChatError, Result, StoreError, SubscriptionError};
pub use feed::{ConnectionState, FeedStream, RealtimeFeed, SubscriptionEvent};
pub use hydrate::{Hydrated, MetadataMiss, hydrate};
pub use likes::{LikeOverlay, PendingState, PendingToggle};
pub use local::LocalBackend;
pub use registry::{Disposer, Subscription, SubscriptionRegistry, list_channel, room_channel};
pub use remote::{HttpBackend, WsFeed};
pub use room::ChatRoom;
pub use session::{ChatListHandle, ChatSession};
pub use state::{ChatListSnapshot, ChatListState, ConversationView, ListStatus, MergeOutcome};
pub use store::{LikeStore, MessageStore, MetadataSource};
pub use synchronizer::{ChatListSynchronizer, ListCommand, OpenedConversation};
