//! Context assembly with a three-level fallback cascade.
//!
//! Levels, tried in order until one yields non-empty content:
//!
//! 1. Ranked retrieval over chunks of ingested sessions.
//! 2. Raw fallback: all chunks for ingested sessions, unranked, capped.
//! 3. Direct content fallback: raw session content read straight from
//!    the store, truncated — covers the window after a re-scrape before
//!    ingestion has produced chunks.
//!
//! When every level is empty the assembler returns an explicit no-data
//! marker rather than an empty string, so synthesis can short-circuit
//! with a fixed message instead of calling the completion API on nothing.

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingGateway;
use crate::error::RagError;
use crate::models::{Project, SessionStatus, SourceRef};
use crate::retrieve::Retriever;
use crate::store::Store;

/// Fixed user-facing message for an empty corpus.
pub const NO_DATA_MESSAGE: &str =
    "I don't have any content for this project yet. Scrape a page first, then ask again.";

/// Outcome of context assembly.
#[derive(Debug, Clone)]
pub enum AssembledContext {
    /// Level 1: ranked retrieval hits.
    Ranked {
        text: String,
        sources: Vec<SourceRef>,
    },
    /// Level 2: unranked chunk dump, capped.
    Raw {
        text: String,
        sources: Vec<SourceRef>,
    },
    /// Level 3: raw session content, truncated.
    Direct {
        text: String,
        sources: Vec<SourceRef>,
    },
    /// Nothing available at any level.
    NoData,
}

impl AssembledContext {
    pub fn text(&self) -> Option<&str> {
        match self {
            AssembledContext::Ranked { text, .. }
            | AssembledContext::Raw { text, .. }
            | AssembledContext::Direct { text, .. } => Some(text),
            AssembledContext::NoData => None,
        }
    }

    pub fn sources(&self) -> &[SourceRef] {
        match self {
            AssembledContext::Ranked { sources, .. }
            | AssembledContext::Raw { sources, .. }
            | AssembledContext::Direct { sources, .. } => sources,
            AssembledContext::NoData => &[],
        }
    }
}

/// Builds the bounded prompt context for one query.
pub struct ContextAssembler<'a> {
    store: &'a dyn Store,
    gateway: &'a EmbeddingGateway,
    config: &'a RetrievalConfig,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(
        store: &'a dyn Store,
        gateway: &'a EmbeddingGateway,
        config: &'a RetrievalConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    pub async fn assemble(
        &self,
        project: &Project,
        query: &str,
    ) -> Result<AssembledContext, RagError> {
        if project.retrieval_enabled {
            if let Some(ranked) = self.ranked_level(&project.id, query).await? {
                tracing::debug!(project = %project.id, "context from ranked retrieval");
                return Ok(ranked);
            }
            if let Some(raw) = self.raw_level(&project.id).await? {
                tracing::debug!(project = %project.id, "context from raw chunk fallback");
                return Ok(raw);
            }
        }

        if let Some(direct) = self.direct_level(&project.id).await? {
            tracing::debug!(project = %project.id, "context from direct content fallback");
            return Ok(direct);
        }

        tracing::debug!(project = %project.id, "no context available at any level");
        Ok(AssembledContext::NoData)
    }

    async fn ranked_level(
        &self,
        project_id: &str,
        query: &str,
    ) -> Result<Option<AssembledContext>, RagError> {
        let retriever = Retriever::new(self.store, self.gateway, self.config);
        let candidates = retriever.retrieve(project_id, query).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let text = candidates
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = candidates
            .iter()
            .map(|c| SourceRef::new(&c.content_key, &c.text, self.config.excerpt_chars))
            .collect();
        Ok(Some(AssembledContext::Ranked { text, sources }))
    }

    async fn raw_level(&self, project_id: &str) -> Result<Option<AssembledContext>, RagError> {
        let sessions = self.store.list_sessions(project_id).await?;
        let keys: Vec<String> = sessions
            .into_iter()
            .filter(|s| s.status == SessionStatus::Ingested)
            .map(|s| s.content_key)
            .collect();
        if keys.is_empty() {
            return Ok(None);
        }

        let mut chunks = self.store.chunks_for_keys(&keys).await?;
        if chunks.is_empty() {
            return Ok(None);
        }
        chunks.truncate(self.config.raw_fallback_max_chunks);

        let text = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = chunks
            .iter()
            .map(|c| SourceRef::new(&c.content_key, &c.text, self.config.excerpt_chars))
            .collect();
        Ok(Some(AssembledContext::Raw { text, sources }))
    }

    async fn direct_level(&self, project_id: &str) -> Result<Option<AssembledContext>, RagError> {
        let sessions = self.store.list_sessions(project_id).await?;
        let mut text = String::new();
        let mut sources = Vec::new();

        for session in sessions
            .iter()
            .filter(|s| s.status != SessionStatus::IngestionFailed)
        {
            if text.len() >= self.config.direct_fallback_max_chars {
                break;
            }
            if let Some(raw) = self.store.get_raw_content(&session.id).await? {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                let remaining = self.config.direct_fallback_max_chars - text.len();
                text.push_str(&truncate_chars(trimmed, remaining));
                sources.push(SourceRef::new(
                    &session.content_key,
                    trimmed,
                    self.config.excerpt_chars,
                ));
            }
        }

        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(AssembledContext::Direct { text, sources }))
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
