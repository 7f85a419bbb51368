//! The history repository contract and its in-memory implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::Message;

use crate::errors::Result;

/// Durable message history.
///
/// `fetch_by_conversation` returns at most `limit` messages of one
/// conversation, newest first, after skipping `offset` newer ones. Callers
/// re-sort for display. Implementations must be safe to call from many
/// sessions at once.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist one message.
    async fn save(&self, message: &Message) -> Result<()>;

    /// A page of a conversation, newest first.
    async fn fetch_by_conversation(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>>;
}

/// Process-local [`MessageRepository`]. History is lost on restart.
#[derive(Default)]
pub struct MemoryMessageRepository {
    // Insertion order; ties on timestamp resolve to the later insert.
    messages: Mutex<Vec<Message>>,
}

impl MemoryMessageRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total messages stored across all conversations.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn save(&self, message: &Message) -> Result<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }

    async fn fetch_by_conversation(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let guard = self.messages.lock();
        let mut matching: Vec<(usize, &Message)> = guard
            .iter()
            .enumerate()
            .filter(|(_, m)| m.conversation_id == conversation_id)
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(_, m)| m.clone())
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
