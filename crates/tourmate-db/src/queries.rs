use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use anyhow::Result;

use crate::Database;
use crate::models::{MessageRow, PostRow, ThreadRow, UserRow, format_timestamp};

const MESSAGE_COLUMNS: &str =
    "m.id, m.sender_id, m.receiver_id, m.post_id, m.content, m.is_checked, m.created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, name: &str, email: &str, avatar: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, avatar) VALUES (?1, ?2, ?3, ?4)",
                (id, name, email, avatar),
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, avatar FROM users WHERE id = ?1",
                [id],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        avatar: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Posts --

    pub fn create_post(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
        content: Option<&str>,
        image: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, user_id, title, content, image) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, user_id, title, content, image),
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id, title, image FROM posts WHERE id = ?1", [id], |row| {
                Ok(PostRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    image: row.get(2)?,
                })
            })
            .optional()
        })
    }

    // -- Messages --

    /// Insert an unchecked message and return the stored row.
    pub fn insert_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        post_id: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<MessageRow> {
        let created_at = format_timestamp(created_at);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, post_id, content, is_checked, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                (sender_id, receiver_id, post_id, content, &created_at),
            )?;

            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                post_id: post_id.to_string(),
                content: content.to_string(),
                is_checked: false,
                created_at,
            })
        })
    }

    /// Every message the user sent or received, newest first.
    pub fn get_messages_for_user(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m
                 WHERE m.sender_id = ?1 OR m.receiver_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| message_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The thread between two users about a post, in either direction, oldest first.
    pub fn get_thread(&self, post_id: &str, user_a: &str, user_b: &str) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| query_thread(conn, post_id, user_a, user_b))
    }

    /// Set `is_checked` on a batch of messages in one statement.
    /// Returns the number of rows that changed.
    pub fn mark_messages_checked(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "UPDATE messages SET is_checked = 1 WHERE is_checked = 0 AND id IN ({})",
                placeholders.join(", ")
            );
            let updated = conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
            Ok(updated)
        })
    }

    // -- Likes --

    pub fn like_exists(&self, post_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM likes WHERE post_id = ?1 AND user_id = ?2)",
                (post_id, user_id),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Idempotent: liking twice keeps a single row.
    pub fn add_like(&self, post_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO likes (post_id, user_id) VALUES (?1, ?2)",
                (post_id, user_id),
            )?;
            Ok(())
        })
    }

    pub fn remove_like(&self, post_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
                (post_id, user_id),
            )?;
            Ok(())
        })
    }
}

fn message_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(offset)?,
        sender_id: row.get(offset + 1)?,
        receiver_id: row.get(offset + 2)?,
        post_id: row.get(offset + 3)?,
        content: row.get(offset + 4)?,
        is_checked: row.get(offset + 5)?,
        created_at: row.get(offset + 6)?,
    })
}

fn query_thread(conn: &Connection, post_id: &str, user_a: &str, user_b: &str) -> Result<Vec<ThreadRow>> {
    // JOIN users twice to fetch both display records in a single query
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS},
                s.id, s.name, s.avatar,
                r.id, r.name, r.avatar
         FROM messages m
         JOIN users s ON m.sender_id = s.id
         JOIN users r ON m.receiver_id = r.id
         WHERE m.post_id = ?1
           AND ((m.sender_id = ?2 AND m.receiver_id = ?3)
             OR (m.sender_id = ?3 AND m.receiver_id = ?2))
         ORDER BY m.created_at ASC, m.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map((post_id, user_a, user_b), |row| {
            Ok(ThreadRow {
                message: message_row(row, 0)?,
                sender: UserRow {
                    id: row.get(7)?,
                    name: row.get(8)?,
                    avatar: row.get(9)?,
                },
                receiver: UserRow {
                    id: row.get(10)?,
                    name: row.get(11)?,
                    avatar: row.get(12)?,
                },
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
