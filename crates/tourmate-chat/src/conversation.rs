use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use uuid::Uuid;

use tourmate_types::models::Message;

/// Identity of a conversation: a post plus the unordered pair of participants.
///
/// The pair is stored sorted, so `new(post, a, b) == new(post, b, a)` and a
/// message maps to the same key whichever side sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    pub post_id: Uuid,
    low: Uuid,
    high: Uuid,
}

impl ConversationKey {
    pub fn new(post_id: Uuid, user_a: Uuid, user_b: Uuid) -> Self {
        let (low, high) = if user_a <= user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };
        Self { post_id, low, high }
    }

    pub fn of(message: &Message) -> Self {
        Self::new(message.post_id, message.sender_id, message.receiver_id)
    }

    pub fn participants(&self) -> (Uuid, Uuid) {
        (self.low, self.high)
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.low == user_id || self.high == user_id
    }

    pub fn counterparty(&self, viewer: Uuid) -> Uuid {
        if self.low == viewer { self.high } else { self.low }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.post_id, self.low, self.high)
    }
}

/// All messages sharing a [`ConversationKey`]. Derived, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub key: ConversationKey,
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Latest by `(created_at, id)`; the id breaks timestamp ties.
    pub fn latest(&self) -> Option<&Message> {
        self.messages.iter().max_by(|a, b| recency(a, b))
    }

    pub fn counterparty(&self, viewer: Uuid) -> Uuid {
        self.key.counterparty(viewer)
    }

    /// Unread for `viewer` when the latest message came from the other side
    /// and has not been checked.
    pub fn is_unread(&self, viewer: Uuid) -> bool {
        self.latest()
            .is_some_and(|m| m.sender_id != viewer && !m.is_checked)
    }
}

fn recency(a: &Message, b: &Message) -> Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

/// Reduce a flat message list into conversations.
///
/// The set of keys and each conversation's message set do not depend on the
/// input order. Within a conversation, messages keep their input order.
pub fn group_by_conversation<'a>(
    messages: impl IntoIterator<Item = &'a Message>,
) -> HashMap<ConversationKey, Conversation> {
    let mut grouped: HashMap<ConversationKey, Conversation> = HashMap::new();
    for message in messages {
        let key = ConversationKey::of(message);
        grouped
            .entry(key)
            .or_insert_with(|| Conversation {
                key,
                messages: Vec::new(),
            })
            .messages
            .push(message.clone());
    }
    grouped
}

/// Order conversations for the list view: most recent message first.
/// Ties fall back to the key so the order is total.
pub fn sort_by_latest(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        match (a.latest(), b.latest()) {
            (Some(x), Some(y)) => recency(y, x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.key.cmp(&b.key))
    });
}

/// Distinct ids that need metadata: one entry per post, one per counterparty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantIds {
    pub post_ids: HashSet<Uuid>,
    pub user_ids: HashSet<Uuid>,
}

impl ParticipantIds {
    pub fn is_empty(&self) -> bool {
        self.post_ids.is_empty() && self.user_ids.is_empty()
    }
}

pub fn derive_participants_and_posts<'a>(
    conversations: impl IntoIterator<Item = &'a Conversation>,
    viewer: Uuid,
) -> ParticipantIds {
    let mut ids = ParticipantIds::default();
    for conversation in conversations {
        ids.post_ids.insert(conversation.key.post_id);
        ids.user_ids.insert(conversation.counterparty(viewer));
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, message};

    fn key_sets(grouped: &HashMap<ConversationKey, Conversation>) -> HashMap<ConversationKey, HashSet<i64>> {
        grouped
            .iter()
            .map(|(k, c)| (*k, c.messages.iter().map(|m| m.id).collect()))
            .collect()
    }

    #[test]
    fn key_is_symmetric_in_participants() {
        let (post, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(ConversationKey::new(post, a, b), ConversationKey::new(post, b, a));
        assert_ne!(ConversationKey::new(post, a, b), ConversationKey::new(Uuid::new_v4(), a, b));
    }

    #[test]
    fn key_display_lists_sorted_pair() {
        let post = Uuid::nil();
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let key = ConversationKey::new(post, high, low);

        assert_eq!(key.to_string(), format!("{}-{}-{}", post, low, high));
        assert_eq!(key.counterparty(low), high);
        assert_eq!(key.counterparty(high), low);
    }

    #[test]
    fn grouping_ignores_input_order() {
        let (post, u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            message(1, u1, u2, post, at(0)),
            message(2, u2, u1, post, at(1)),
            message(3, u3, u1, post, at(2)),
            message(4, u1, u3, Uuid::new_v4(), at(3)),
            message(5, u2, u1, post, at(4)),
        ];
        let expected = key_sets(&group_by_conversation(&messages));

        let mut reversed = messages.clone();
        reversed.reverse();
        assert_eq!(key_sets(&group_by_conversation(&reversed)), expected);

        for shift in 1..messages.len() {
            let mut rotated = messages.clone();
            rotated.rotate_left(shift);
            assert_eq!(key_sets(&group_by_conversation(&rotated)), expected);
        }
    }

    #[test]
    fn grouping_is_idempotent_and_keeps_internal_order() {
        let (post, u1, u2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            message(7, u2, u1, post, at(9)),
            message(3, u1, u2, post, at(1)),
        ];

        let once = group_by_conversation(&messages);
        let flattened: Vec<Message> = once.values().flat_map(|c| c.messages.clone()).collect();
        assert_eq!(group_by_conversation(&flattened), once);

        let ids: Vec<i64> = once[&ConversationKey::new(post, u1, u2)]
            .messages
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, [7, 3]);
    }

    #[test]
    fn same_post_different_counterparties_are_separate() {
        let (p1, u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            message(1, u2, u1, p1, at(0)),
            message(2, u1, u3, p1, at(1)),
        ];

        let grouped = group_by_conversation(&messages);
        assert_eq!(grouped.len(), 2);
        assert!(grouped.contains_key(&ConversationKey::new(p1, u1, u2)));
        assert!(grouped.contains_key(&ConversationKey::new(p1, u1, u3)));
    }

    #[test]
    fn unread_truth_table() {
        let (post, viewer, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let conversation = |sender: Uuid, receiver: Uuid, checked: bool| {
            let mut m = message(1, sender, receiver, post, at(0));
            m.is_checked = checked;
            Conversation {
                key: ConversationKey::of(&m),
                messages: vec![m],
            }
        };

        assert!(conversation(other, viewer, false).is_unread(viewer));
        assert!(!conversation(other, viewer, true).is_unread(viewer));
        assert!(!conversation(viewer, other, false).is_unread(viewer));
        assert!(!conversation(viewer, other, true).is_unread(viewer));
    }

    #[test]
    fn unread_looks_at_latest_message_only() {
        let (post, viewer, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let conversation = Conversation {
            key: ConversationKey::new(post, viewer, other),
            messages: vec![
                message(2, viewer, other, post, at(5)),
                message(1, other, viewer, post, at(1)),
            ],
        };

        assert_eq!(conversation.latest().map(|m| m.id), Some(2));
        assert!(!conversation.is_unread(viewer));
    }

    #[test]
    fn later_message_sorts_conversation_first() {
        let (viewer, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            message(1, u2, viewer, p1, at(0)),
            message(2, u3, viewer, p2, at(10)),
            message(3, viewer, u2, p1, at(20)),
        ];

        let mut list: Vec<Conversation> = group_by_conversation(&messages).into_values().collect();
        sort_by_latest(&mut list);

        assert_eq!(list[0].key, ConversationKey::new(p1, viewer, u2));
        assert_eq!(list[1].key, ConversationKey::new(p2, viewer, u3));
    }

    #[test]
    fn derived_ids_are_distinct_and_exclude_viewer() {
        let (viewer, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            message(1, u2, viewer, p1, at(0)),
            message(2, viewer, u2, p1, at(1)),
            message(3, u2, viewer, p2, at(2)),
            message(4, viewer, u3, p1, at(3)),
        ];

        let grouped = group_by_conversation(&messages);
        let ids = derive_participants_and_posts(grouped.values(), viewer);

        assert_eq!(ids.post_ids, HashSet::from([p1, p2]));
        assert_eq!(ids.user_ids, HashSet::from([u2, u3]));
    }
}
