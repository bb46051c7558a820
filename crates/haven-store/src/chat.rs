//! Append-only chat transcripts keyed by `(user, topic)`.
//!
//! Each message is its own row. An append is one `INSERT`, and the
//! `AUTOINCREMENT` sequence assigned by SQLite fixes its position, so two
//! concurrent appenders to the same topic both land, in a stable order,
//! without either reading the transcript first.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use haven_shared::types::{format_timestamp, now_utc, truncate_micros};
use haven_shared::{ChatRole, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ChatMessage, NewChatMessage};
use crate::records::timestamp_column;

impl Database {
    /// Messages of a topic in append order. A topic never written and a
    /// cleared topic both read as empty.
    pub fn read_chat(&self, user: &UserId, topic: &str) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, text, role, created_at
             FROM chat_messages
             WHERE user_id = ?1 AND topic_key = ?2
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![user.as_str(), topic], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Append a message, stamping `id` and `createdAt` when absent.
    ///
    /// Re-sending a message whose `id` is already in the topic returns the
    /// stored copy instead of appending it twice.
    pub fn append_chat(
        &self,
        user: &UserId,
        topic: &str,
        message: NewChatMessage,
    ) -> Result<ChatMessage> {
        let stored = ChatMessage {
            id: message.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            text: message.text,
            role: message.role,
            created_at: message
                .created_at
                .map(truncate_micros)
                .unwrap_or_else(now_utc),
        };

        let inserted = self.conn().execute(
            "INSERT INTO chat_messages (user_id, topic_key, id, role, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (user_id, topic_key, id) DO NOTHING",
            params![
                user.as_str(),
                topic,
                stored.id,
                stored.role.as_str(),
                stored.text,
                format_timestamp(&stored.created_at),
            ],
        )?;

        if inserted == 0 {
            tracing::debug!(user = %user, topic, id = %stored.id, "duplicate chat append ignored");
            return self
                .conn()
                .query_row(
                    "SELECT id, text, role, created_at
                     FROM chat_messages
                     WHERE user_id = ?1 AND topic_key = ?2 AND id = ?3",
                    params![user.as_str(), topic, stored.id],
                    row_to_message,
                )
                .optional()?
                .ok_or(StoreError::NotFound);
        }

        tracing::debug!(user = %user, topic, id = %stored.id, "chat message appended");
        Ok(stored)
    }

    /// Remove every message in the topic. Returns how many were removed;
    /// clearing an empty topic is not an error.
    pub fn clear_chat(&self, user: &UserId, topic: &str) -> Result<usize> {
        let removed = self.conn().execute(
            "DELETE FROM chat_messages WHERE user_id = ?1 AND topic_key = ?2",
            params![user.as_str(), topic],
        )?;
        tracing::debug!(user = %user, topic, removed, "chat topic cleared");
        Ok(removed)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let id: String = row.get(0)?;
    let text: String = row.get(1)?;
    let role_str: String = row.get(2)?;
    let created_at = timestamp_column(row, 3)?;

    let role = role_str.parse::<ChatRole>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ChatMessage {
        id,
        text,
        role,
        created_at,
    })
}
