//! `SQLite` backend for message history.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode applied to every connection.
//! - **[`migrations`]**: Version-tracked schema, embedded at compile time.
//! - **[`message_repo`]**: Stateless SQL over a borrowed `&Connection`.
//! - **[`SqliteMessageRepository`]**: The async [`MessageRepository`] facade
//!   that moves each call onto the blocking pool.
//!
//! [`MessageRepository`]: crate::MessageRepository

pub mod connection;
pub mod message_repo;
pub mod migrations;

use std::path::Path;

use async_trait::async_trait;
use relay_core::Message;
use tracing::{debug, instrument};

use crate::errors::{Result, StoreError};
use crate::repository::MessageRepository;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory};
pub use message_repo::MessageRepo;
pub use migrations::{current_version, latest_version, run_migrations};

/// [`MessageRepository`] backed by a pooled `SQLite` database.
#[derive(Clone)]
pub struct SqliteMessageRepository {
    pool: ConnectionPool,
}

impl SqliteMessageRepository {
    /// Open (and migrate) a file-backed database.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        Self::from_pool(new_file(path, config)?)
    }

    /// Open (and migrate) a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(new_in_memory(&ConnectionConfig::default())?)
    }

    /// Wrap an existing pool, running pending migrations first.
    pub fn from_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let applied = run_migrations(&conn)?;
        debug!(applied, "history schema ready");
        drop(conn);
        Ok(Self { pool })
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&PooledConnection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }

    /// Number of stored messages in a conversation.
    pub async fn count(&self, conversation_id: &str) -> Result<u64> {
        let conversation_id = conversation_id.to_owned();
        self.with_conn(move |conn| MessageRepo::count_by_conversation(conn, &conversation_id))
            .await
    }
}

#[async_trait]
impl MessageRepository for SqliteMessageRepository {
    #[instrument(
        skip_all,
        fields(message_id = %message.id, conversation_id = %message.conversation_id)
    )]
    async fn save(&self, message: &Message) -> Result<()> {
        let message = message.clone();
        self.with_conn(move |conn| MessageRepo::insert(conn, &message))
            .await
    }

    #[instrument(skip(self))]
    async fn fetch_by_conversation(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conversation_id = conversation_id.to_owned();
        self.with_conn(move |conn| MessageRepo::fetch_page(conn, &conversation_id, limit, offset))
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
