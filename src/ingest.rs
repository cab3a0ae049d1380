//! Ingestion coordination: turning one scraped session into a visible,
//! retrievable chunk set.
//!
//! The coordinator owns the session lifecycle (`scraped` → `ingesting` →
//! `ingested` | `ingestion_failed`) and the consistency rules around it:
//!
//! - At most one ingestion runs per content key at a time.
//! - Before writing, chunks of superseded sessions (earlier scrapes of the
//!   same URL) and any stale chunks under this session's own key are
//!   deleted, so a content key never mixes stale and fresh chunks.
//! - Chunks only become visible to retrieval once the session reaches
//!   `ingested`; a failed run deletes whatever it wrote and marks the
//!   session `ingestion_failed`.
//!
//! Re-running ingestion for the same session and content converges on the
//! same chunk set: chunking is deterministic and each run starts from a
//! clean key.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{Config, ProviderCredentials};
use crate::embedding::EmbeddingGateway;
use crate::error::RagError;
use crate::models::{Chunk, EmbeddingOrigin, ScrapedContent, Session, SessionStatus};
use crate::progress::{IngestProgress, ProgressReporter};
use crate::store::Store;

/// Running counters across all ingestions handled by one coordinator.
#[derive(Debug, Default)]
pub struct IngestStats {
    chunks_written: AtomicU64,
    provider_embeddings: AtomicU64,
    fallback_embeddings: AtomicU64,
    supersessions: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStatsSnapshot {
    pub chunks_written: u64,
    pub provider_embeddings: u64,
    pub fallback_embeddings: u64,
    pub supersessions: u64,
    pub failures: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            provider_embeddings: self.provider_embeddings.load(Ordering::Relaxed),
            fallback_embeddings: self.fallback_embeddings.load(Ordering::Relaxed),
            supersessions: self.supersessions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Drives sessions through ingestion against a shared store.
pub struct IngestionCoordinator {
    store: Arc<dyn Store>,
    config: Config,
    in_flight: Arc<Mutex<HashSet<String>>>,
    stats: IngestStats,
}

/// Releases the in-flight reservation for a content key when the
/// ingestion call returns by any path.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    content_key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&self.content_key);
    }
}

/// Rolls back a cancelled ingestion: if the call's future is dropped
/// mid-write, the partial chunk set is deleted and the session marked
/// failed on a spawned task, the same end state as an in-band failure.
struct CleanupGuard {
    store: Arc<dyn Store>,
    session_id: String,
    content_key: String,
    armed: bool,
}

impl CleanupGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = Arc::clone(&self.store);
        let session_id = self.session_id.clone();
        let content_key = self.content_key.clone();
        tokio::spawn(async move {
            if let Err(e) = store.delete_chunks(&content_key).await {
                tracing::warn!(content_key = %content_key, "cancelled-ingest chunk cleanup failed: {e}");
            }
            if let Err(e) = store
                .set_session_status(&session_id, SessionStatus::IngestionFailed)
                .await
            {
                tracing::warn!(session_id = %session_id, "cancelled-ingest status update failed: {e}");
            }
        });
    }
}

impl IngestionCoordinator {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }

    /// Ingest one session's content.
    ///
    /// Returns `Ok(true)` when the session reached `ingested`, `Ok(false)`
    /// when the run failed and was rolled back to `ingestion_failed`, and
    /// `Err` only for consistency violations (unknown session, concurrent
    /// ingestion of the same content key, stale chunks that could not be
    /// cleared).
    pub async fn ingest(
        &self,
        session_id: &str,
        content: &ScrapedContent,
        credentials: &ProviderCredentials,
        reporter: &dyn ProgressReporter,
    ) -> Result<bool, RagError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| {
                RagError::IngestionConsistencyViolation(format!("unknown session {session_id}"))
            })?;

        let _in_flight = self.reserve(&session)?;

        self.store
            .set_session_status(&session.id, SessionStatus::Ingesting)
            .await?;

        let texts = crate::chunk::chunk_content(content, self.config.chunking.target_size);
        tracing::info!(
            session = %session.id,
            chunks = texts.len(),
            "ingesting session"
        );
        reporter.report(IngestProgress::new(
            "ingesting",
            "ingestion started",
            0,
            texts.len(),
        ));

        self.supersede_prior_sessions(&session).await?;
        self.clear_own_key(&session).await?;
        self.store
            .put_raw_content(&session.id, &raw_text(content, &texts))
            .await?;

        if texts.is_empty() {
            self.store
                .set_session_status(&session.id, SessionStatus::Ingested)
                .await?;
            reporter.report(IngestProgress::new("ingested", "no chunkable content", 0, 0));
            return Ok(true);
        }

        let mut cleanup = CleanupGuard {
            store: Arc::clone(&self.store),
            session_id: session.id.clone(),
            content_key: session.content_key.clone(),
            armed: true,
        };

        match self
            .write_chunks(&session, &texts, credentials, reporter)
            .await
        {
            Ok(()) => {
                self.store
                    .set_session_status(&session.id, SessionStatus::Ingested)
                    .await?;
                cleanup.disarm();
                reporter.report(IngestProgress::new(
                    "ingested",
                    "ingestion complete",
                    texts.len(),
                    texts.len(),
                ));
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(session = %session.id, "ingestion failed, rolling back: {e}");
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                self.store.delete_chunks(&session.content_key).await?;
                self.store
                    .set_session_status(&session.id, SessionStatus::IngestionFailed)
                    .await?;
                cleanup.disarm();
                reporter.report(IngestProgress::new(
                    "ingestion_failed",
                    e.to_string(),
                    0,
                    texts.len(),
                ));
                Ok(false)
            }
        }
    }

    fn reserve(&self, session: &Session) -> Result<InFlightGuard, RagError> {
        let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
        if !in_flight.insert(session.content_key.clone()) {
            return Err(RagError::IngestionConsistencyViolation(format!(
                "content key {} is already being ingested",
                session.content_key
            )));
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            content_key: session.content_key.clone(),
        })
    }

    /// Delete chunks and cached raw content of earlier scrapes of the
    /// same URL. Their sessions keep their terminal status but can no
    /// longer contribute content at any level.
    async fn supersede_prior_sessions(&self, session: &Session) -> Result<(), RagError> {
        let sessions = self.store.list_sessions(&session.project_id).await?;
        for prior in sessions
            .iter()
            .filter(|s| s.id != session.id && s.url == session.url)
        {
            let removed = self.store.delete_chunks(&prior.content_key).await?;
            let had_raw = self.store.get_raw_content(&prior.id).await?.is_some();
            self.store.delete_raw_content(&prior.id).await?;
            // Already-drained priors (cleared by an earlier ingest) are
            // not counted again.
            if removed > 0 || had_raw {
                tracing::debug!(
                    superseded = %prior.id,
                    removed,
                    "cleared superseded session"
                );
                self.stats.supersessions.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Remove any stale chunks under this session's own key and verify
    /// the key is empty before fresh writes begin.
    async fn clear_own_key(&self, session: &Session) -> Result<(), RagError> {
        self.store.delete_chunks(&session.content_key).await?;
        let remaining = self.store.count_chunks(&session.content_key).await?;
        if remaining != 0 {
            return Err(RagError::IngestionConsistencyViolation(format!(
                "content key {} still holds {remaining} chunks after clearing",
                session.content_key
            )));
        }
        Ok(())
    }

    /// Embed and persist chunks batch by batch, in ordinal order.
    async fn write_chunks(
        &self,
        session: &Session,
        texts: &[String],
        credentials: &ProviderCredentials,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), RagError> {
        let gateway =
            EmbeddingGateway::new(&self.config.embedding, credentials.api_key.as_deref());
        let batch_size = self.config.embedding.batch_size.max(1);
        let mut written = 0usize;

        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            let embedded = gateway.embed_texts(batch).await;

            let mut chunks = Vec::with_capacity(batch.len());
            for (offset, (text, embedded)) in batch.iter().zip(embedded).enumerate() {
                let ordinal = (batch_index * batch_size + offset) as i64;
                let mut chunk = Chunk::new(&session.content_key, ordinal, text.clone());
                match embedded.origin {
                    EmbeddingOrigin::Provider => {
                        self.stats.provider_embeddings.fetch_add(1, Ordering::Relaxed)
                    }
                    EmbeddingOrigin::Fallback => {
                        self.stats.fallback_embeddings.fetch_add(1, Ordering::Relaxed)
                    }
                };
                chunk.vector = Some(embedded.vector);
                chunk.vector_origin = Some(embedded.origin);
                chunks.push(chunk);
            }

            self.store.put_chunks(&session.content_key, &chunks).await?;
            written += chunks.len();
            self.stats
                .chunks_written
                .fetch_add(chunks.len() as u64, Ordering::Relaxed);
            reporter.report(IngestProgress::new(
                "ingesting",
                format!("embedded batch {}", batch_index + 1),
                written,
                texts.len(),
            ));
        }

        Ok(())
    }
}

/// Canonical raw-content form cached alongside the chunk set, serving the
/// direct-content fallback.
fn raw_text(content: &ScrapedContent, chunks: &[String]) -> String {
    match content {
        ScrapedContent::Text(text) => text.clone(),
        ScrapedContent::Records(_) => chunks.join("\n\n"),
    }
}
