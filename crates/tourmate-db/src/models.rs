/// Database row types. These map directly to SQLite rows; conversion into
/// the tourmate-types models happens here so callers never see raw text ids.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use tourmate_types::models::{
    Message, PLACEHOLDER_IMAGE, PLACEHOLDER_NAME, PostSummary, ThreadMessage, UserSummary,
};

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

pub struct PostRow {
    pub id: String,
    pub title: Option<String>,
    pub image: Option<String>,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub post_id: String,
    pub content: String,
    pub is_checked: bool,
    pub created_at: String,
}

pub struct ThreadRow {
    pub message: MessageRow,
    pub sender: UserRow,
    pub receiver: UserRow,
}

/// Format used for every timestamp this crate writes. Fixed width, so text
/// ordering in SQLite matches chronological ordering.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; treat it as UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("invalid timestamp '{}'", raw))
}

fn parse_id(raw: &str, column: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .with_context(|| format!("invalid {} '{}'", column, raw))
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id,
            sender_id: parse_id(&row.sender_id, "sender_id")?,
            receiver_id: parse_id(&row.receiver_id, "receiver_id")?,
            post_id: parse_id(&row.post_id, "post_id")?,
            created_at: parse_timestamp(&row.created_at)?,
            content: row.content,
            is_checked: row.is_checked,
        })
    }
}

impl TryFrom<UserRow> for UserSummary {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(UserSummary {
            id: parse_id(&row.id, "user id")?,
            name: if row.name.is_empty() { PLACEHOLDER_NAME.to_string() } else { row.name },
            avatar: row.avatar.unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
        })
    }
}

impl TryFrom<PostRow> for PostSummary {
    type Error = anyhow::Error;

    fn try_from(row: PostRow) -> Result<Self> {
        Ok(PostSummary {
            id: parse_id(&row.id, "post id")?,
            title: row.title.unwrap_or_else(|| PLACEHOLDER_NAME.to_string()),
            image: row.image.unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
        })
    }
}

impl TryFrom<ThreadRow> for ThreadMessage {
    type Error = anyhow::Error;

    fn try_from(row: ThreadRow) -> Result<Self> {
        Ok(ThreadMessage {
            message: row.message.try_into()?,
            sender: row.sender.try_into()?,
            receiver: row.receiver.try_into()?,
        })
    }
}
