//! Message repository for the `messages` table.

use chrono::{DateTime, SecondsFormat, Utc};
use relay_core::{Message, MessageId, MessageKind};
use rusqlite::types::Type;
use rusqlite::{Connection, params};

use crate::errors::Result;

/// Message repository. Stateless, every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Insert one message. Fails if the ID is already stored.
    pub fn insert(conn: &Connection, message: &Message) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO messages (id, conversation_id, user_id, username, content, type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.as_str(),
                message.conversation_id,
                message.user_id,
                message.username,
                message.content,
                message.kind.as_str(),
                encode_timestamp(message.timestamp),
            ],
        )?;
        Ok(())
    }

    /// A page of a conversation, newest first.
    pub fn fetch_page(
        conn: &Connection,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, conversation_id, user_id, username, content, type, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at DESC, seq DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![conversation_id, limit, offset], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of stored messages in a conversation.
    pub fn count_by_conversation(conn: &Connection, conversation_id: &str) -> Result<u64> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
        let kind: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        Ok(Message {
            id: MessageId::from(row.get::<_, String>(0)?),
            conversation_id: row.get(1)?,
            user_id: row.get(2)?,
            username: row.get(3)?,
            content: row.get(4)?,
            kind: kind
                .parse::<MessageKind>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?,
            timestamp: DateTime::parse_from_rfc3339(&created_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
                })?,
        })
    }
}

/// Fixed-width RFC 3339 so string order matches time order.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
