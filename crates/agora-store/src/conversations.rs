//! Private two-party conversations and their messages.

use agora_core::{AgoraError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::store::{SqliteStore, new_id, parse_ts, store_err, ts};
use crate::types::{Conversation, DirectMessage};

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        created_at: parse_ts(&row.get::<_, String>(3)?),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirectMessage> {
    Ok(DirectMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        recipient_id: row.get(3)?,
        content: row.get(4)?,
        created_at: parse_ts(&row.get::<_, String>(5)?),
    })
}

fn sorted_pair<'a>(x: &'a str, y: &'a str) -> (&'a str, &'a str) {
    if x <= y { (x, y) } else { (y, x) }
}

impl SqliteStore {
    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.db()
            .query_row(
                "SELECT id, participant_a, participant_b, created_at FROM conversations WHERE id = ?1",
                params![id],
                row_to_conversation,
            )
            .optional()
            .map_err(store_err)
    }

    pub fn require_conversation(&self, id: &str) -> Result<Conversation> {
        self.get_conversation(id)?
            .ok_or_else(|| AgoraError::not_found("conversation", id))
    }

    pub fn find_conversation(&self, x: &str, y: &str) -> Result<Option<Conversation>> {
        let (a, b) = sorted_pair(x, y);
        self.db()
            .query_row(
                "SELECT id, participant_a, participant_b, created_at FROM conversations
                 WHERE participant_a = ?1 AND participant_b = ?2",
                params![a, b],
                row_to_conversation,
            )
            .optional()
            .map_err(store_err)
    }

    /// The conversation between two actors, created if missing.
    ///
    /// The pair is unordered and unique in the table, so concurrent callers
    /// converge on one row. Returns whether this call created it.
    pub fn find_or_create_conversation(&self, x: &str, y: &str) -> Result<(Conversation, bool)> {
        let (a, b) = sorted_pair(x, y);
        let db = self.db();
        let created = db
            .execute(
                "INSERT INTO conversations (id, participant_a, participant_b, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(participant_a, participant_b) DO NOTHING",
                params![new_id(), a, b, ts(self.now())],
            )
            .map_err(store_err)?
            > 0;
        let conversation = db
            .query_row(
                "SELECT id, participant_a, participant_b, created_at FROM conversations
                 WHERE participant_a = ?1 AND participant_b = ?2",
                params![a, b],
                row_to_conversation,
            )
            .map_err(store_err)?;
        Ok((conversation, created))
    }

    pub fn conversation_count(&self) -> Result<u64> {
        self.db()
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(store_err)
    }

    /// Append a message. The recipient is derived from the conversation.
    pub fn add_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<DirectMessage> {
        let conversation = self.require_conversation(conversation_id)?;
        let recipient_id = conversation
            .other_participant(sender_id)
            .ok_or_else(|| AgoraError::InvalidToolInput {
                tool: "message".into(),
                reason: format!("{sender_id} is not part of conversation {conversation_id}"),
            })?
            .to_string();
        let id = new_id();
        let now = self.now();
        self.db()
            .execute(
                "INSERT INTO messages (id, conversation_id, sender_id, recipient_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, conversation_id, sender_id, recipient_id, content, ts(now)],
            )
            .map_err(store_err)?;
        Ok(DirectMessage {
            id,
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            recipient_id,
            content: content.into(),
            created_at: now,
        })
    }

    /// The newest `limit` messages of a conversation, returned oldest first.
    pub fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<DirectMessage>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT id, conversation_id, sender_id, recipient_id, content, created_at FROM messages
                 WHERE conversation_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )
            .map_err(store_err)?;
        let mut rows = stmt
            .query_map(params![conversation_id, limit as i64], row_to_message)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        rows.reverse();
        Ok(rows)
    }

    /// Messages from `sender_id` to `recipient_id` with `since <= created_at < until`.
    pub fn messages_between(
        &self,
        sender_id: &str,
        recipient_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DirectMessage>> {
        let db = self.db();
        let mut stmt = db
            .prepare(
                "SELECT id, conversation_id, sender_id, recipient_id, content, created_at FROM messages
                 WHERE sender_id = ?1 AND recipient_id = ?2
                   AND created_at >= ?3 AND created_at < ?4
                 ORDER BY created_at",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(
                params![sender_id, recipient_id, ts(since), ts(until)],
                row_to_message,
            )
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }
}
