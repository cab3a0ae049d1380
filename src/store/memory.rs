//! In-memory [`Store`] implementation for tests and embedded callers.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Chunk lookup is a linear scan; fine at the corpus sizes this backend
//! is used for.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Project, Session, SessionStatus};

use super::Store;

/// In-memory store backend.
#[derive(Default)]
pub struct InMemoryStore {
    projects: RwLock<HashMap<String, Project>>,
    sessions: RwLock<Vec<Session>>,
    chunks: RwLock<Vec<Chunk>>,
    raw_content: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let projects = self.projects.read().unwrap();
        Ok(projects.get(project_id).cloned())
    }

    async fn put_project(&self, project: &Project) -> Result<()> {
        let mut projects = self.projects.write().unwrap();
        projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions.iter().find(|s| s.id == session_id).cloned())
    }

    async fn put_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        if let Some(existing) = sessions.iter_mut().find(|s| s.id == session.id) {
            *existing = session.clone();
        } else {
            sessions.push(session.clone());
        }
        Ok(())
    }

    async fn set_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.iter_mut().find(|s| s.id == session_id) {
            Some(session) => {
                session.status = status;
                Ok(())
            }
            None => anyhow::bail!("unknown session: {}", session_id),
        }
    }

    async fn list_sessions(&self, project_id: &str) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions
            .iter()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn put_chunks(&self, content_key: &str, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        for chunk in chunks {
            debug_assert_eq!(chunk.content_key, content_key);
            stored.push(chunk.clone());
        }
        Ok(())
    }

    async fn delete_chunks(&self, content_key: &str) -> Result<u64> {
        let mut stored = self.chunks.write().unwrap();
        let before = stored.len();
        stored.retain(|c| c.content_key != content_key);
        Ok((before - stored.len()) as u64)
    }

    async fn count_chunks(&self, content_key: &str) -> Result<u64> {
        let stored = self.chunks.read().unwrap();
        Ok(stored.iter().filter(|c| c.content_key == content_key).count() as u64)
    }

    async fn chunks_for_keys(&self, content_keys: &[String]) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().unwrap();
        let mut result: Vec<Chunk> = stored
            .iter()
            .filter(|c| content_keys.iter().any(|k| k == &c.content_key))
            .cloned()
            .collect();
        result.sort_by(|a, b| {
            a.content_key
                .cmp(&b.content_key)
                .then(a.ordinal.cmp(&b.ordinal))
        });
        Ok(result)
    }

    async fn get_raw_content(&self, session_id: &str) -> Result<Option<String>> {
        let raw = self.raw_content.read().unwrap();
        Ok(raw.get(session_id).cloned())
    }

    async fn put_raw_content(&self, session_id: &str, content: &str) -> Result<()> {
        let mut raw = self.raw_content.write().unwrap();
        raw.insert(session_id.to_string(), content.to_string());
        Ok(())
    }

    async fn delete_raw_content(&self, session_id: &str) -> Result<()> {
        let mut raw = self.raw_content.write().unwrap();
        raw.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunk_lifecycle() {
        let store = InMemoryStore::new();
        let chunks = vec![Chunk::new("ck1", 0, "alpha"), Chunk::new("ck1", 1, "beta")];
        store.put_chunks("ck1", &chunks).await.unwrap();
        assert_eq!(store.count_chunks("ck1").await.unwrap(), 2);

        let loaded = store
            .chunks_for_keys(&["ck1".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].ordinal, 0);

        let deleted = store.delete_chunks("ck1").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count_chunks("ck1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chunks_for_keys_ordering() {
        let store = InMemoryStore::new();
        store
            .put_chunks("b", &[Chunk::new("b", 1, "b1"), Chunk::new("b", 0, "b0")])
            .await
            .unwrap();
        store
            .put_chunks("a", &[Chunk::new("a", 0, "a0")])
            .await
            .unwrap();
        let loaded = store
            .chunks_for_keys(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let keys: Vec<(&str, i64)> = loaded
            .iter()
            .map(|c| (c.content_key.as_str(), c.ordinal))
            .collect();
        assert_eq!(keys, vec![("a", 0), ("b", 0), ("b", 1)]);
    }

    #[tokio::test]
    async fn test_session_status_update() {
        let store = InMemoryStore::new();
        let session = Session::new("p1", "https://example.com");
        store.put_session(&session).await.unwrap();
        store
            .set_session_status(&session.id, SessionStatus::Ingested)
            .await
            .unwrap();
        let loaded = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Ingested);
    }

    #[tokio::test]
    async fn test_unknown_session_status_errors() {
        let store = InMemoryStore::new();
        assert!(store
            .set_session_status("missing", SessionStatus::Ingested)
            .await
            .is_err());
    }
}
