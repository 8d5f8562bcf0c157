use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Which inserted messages a realtime subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum FeedFilter {
    /// Messages where the user is sender or receiver (chat list).
    Participant(Uuid),
    /// Messages about a post (chat room).
    Post(Uuid),
}

impl FeedFilter {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::Participant(user_id) => message.involves(*user_id),
            Self::Post(post_id) => message.post_id == *post_id,
        }
    }
}

/// Events sent over the realtime WebSocket feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// Server confirms the filter is active
    Subscribed { filter: FeedFilter },

    /// A message matching the filter was inserted
    MessageInsert { message: Message },

    /// The connection fell behind and dropped events; the client must refetch
    Lagged { skipped: u64 },
}

/// Commands sent FROM client TO server over the realtime WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedCommand {
    /// Start receiving inserts matching `filter`. Replaces any earlier filter.
    Subscribe { filter: FeedFilter },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(sender: Uuid, receiver: Uuid, post: Uuid) -> Message {
        Message {
            id: 1,
            sender_id: sender,
            receiver_id: receiver,
            post_id: post,
            content: "hello".into(),
            created_at: Utc::now(),
            is_checked: false,
        }
    }

    #[test]
    fn participant_filter_matches_either_side() {
        let (a, b, c, post) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let filter = FeedFilter::Participant(a);

        assert!(filter.matches(&message(a, b, post)));
        assert!(filter.matches(&message(b, a, post)));
        assert!(!filter.matches(&message(b, c, post)));
    }

    #[test]
    fn post_filter_ignores_participants() {
        let (a, b, post) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert!(FeedFilter::Post(post).matches(&message(a, b, post)));
        assert!(!FeedFilter::Post(Uuid::new_v4()).matches(&message(a, b, post)));
    }

    #[test]
    fn subscribe_command_wire_shape() {
        let id = Uuid::nil();
        let json = serde_json::to_value(FeedCommand::Subscribe {
            filter: FeedFilter::Post(id),
        })
        .unwrap();

        assert_eq!(json["type"], "Subscribe");
        assert_eq!(json["data"]["filter"]["kind"], "Post");
        assert_eq!(json["data"]["filter"]["id"], id.to_string());
    }
}
