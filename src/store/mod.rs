//! Storage abstraction over the external persistence collaborator.
//!
//! The durable engine itself is out of scope; this trait captures the
//! simple get/put/delete/filter surface the answering core needs. Chunk
//! rows are keyed by `(content_key, ordinal)`, sessions by id, raw page
//! content by session id.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Project, Session, SessionStatus};

/// Abstract storage backend for the answering core.
///
/// Chunk visibility is governed by session status: retrieval only reads
/// chunks whose session is `ingested`, so partially written chunk sets
/// under an `ingesting` session are never observable through queries.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a project by id.
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>>;

    /// Insert or replace a project row. Called by the project-management
    /// collaborator (and by tests); the core itself never writes projects.
    async fn put_project(&self, project: &Project) -> Result<()>;

    /// Fetch a session by id.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    /// Insert or replace a session row.
    async fn put_session(&self, session: &Session) -> Result<()>;

    /// Advance a session's lifecycle status.
    async fn set_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;

    /// All sessions belonging to a project, in creation order.
    async fn list_sessions(&self, project_id: &str) -> Result<Vec<Session>>;

    /// Append a batch of chunk rows for a content key.
    async fn put_chunks(&self, content_key: &str, chunks: &[Chunk]) -> Result<()>;

    /// Delete every chunk for a content key. Returns the number removed.
    async fn delete_chunks(&self, content_key: &str) -> Result<u64>;

    /// Number of chunks currently stored for a content key.
    async fn count_chunks(&self, content_key: &str) -> Result<u64>;

    /// All chunks whose content key is in the given set, ordered by
    /// `(content_key, ordinal)`.
    async fn chunks_for_keys(&self, content_keys: &[String]) -> Result<Vec<Chunk>>;

    /// Raw ingested page content for a session, if cached.
    async fn get_raw_content(&self, session_id: &str) -> Result<Option<String>>;

    /// Cache raw page content for a session.
    async fn put_raw_content(&self, session_id: &str, content: &str) -> Result<()>;

    /// Drop the cached raw content for a session.
    async fn delete_raw_content(&self, session_id: &str) -> Result<()>;
}
