//! Core data models for the answering pipeline.
//!
//! These types represent the projects, scrape sessions, and chunks that
//! flow through ingestion and retrieval. Projects and sessions are created
//! by external collaborators; this crate only reads projects and advances
//! session status during ingestion.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A project owning scraped URLs. Read-only to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    /// When false, chunk/vector retrieval is skipped and answers are
    /// served from raw session content only.
    pub retrieval_enabled: bool,
}

/// Lifecycle state of a scrape session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scraped,
    Ingesting,
    Ingested,
    IngestionFailed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scraped => "scraped",
            SessionStatus::Ingesting => "ingesting",
            SessionStatus::Ingested => "ingested",
            SessionStatus::IngestionFailed => "ingestion_failed",
        }
    }
}

/// One scraped version of one URL.
///
/// The `content_key` scopes every chunk belonging to this version. A new
/// scrape of the same URL produces a new session with a new content key;
/// ingestion of the new session invalidates the old one's chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub url: String,
    pub content_key: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session in the `scraped` state with a derived content key.
    pub fn new(project_id: impl Into<String>, url: impl Into<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        let content_key = format!("content-{}", id);
        Self {
            id,
            project_id: project_id.into(),
            url: url.into(),
            content_key,
            status: SessionStatus::Scraped,
            created_at: Utc::now(),
        }
    }
}

/// Where an embedding vector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingOrigin {
    /// Returned by the external embedding provider.
    Provider,
    /// Derived deterministically from the text (offline fallback).
    Fallback,
}

/// A retrieval-unit fragment of ingested content.
///
/// The chunk set for a content key is either fully present or fully
/// absent; ordinals are unique and contiguous within one content key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub content_key: String,
    pub ordinal: i64,
    pub text: String,
    pub hash: String,
    pub vector: Option<Vec<f32>>,
    pub vector_origin: Option<EmbeddingOrigin>,
}

impl Chunk {
    pub fn new(content_key: impl Into<String>, ordinal: i64, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        Self {
            content_key: content_key.into(),
            ordinal,
            text,
            hash,
            vector: None,
            vector_origin: None,
        }
    }
}

/// A structured record extracted from a page: key → value with stable
/// (sorted) key ordering, so rendering is deterministic.
pub type Record = BTreeMap<String, serde_json::Value>;

/// Content handed over by the content-extraction collaborator, normalized
/// into one of two canonical shapes at the ingestion boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScrapedContent {
    /// Structured records (listings, tabular rows, a singleton object).
    Records(Vec<Record>),
    /// Raw markdown / plain text body.
    Text(String),
}

impl ScrapedContent {
    /// Normalize raw structured scrape output into `Records`.
    ///
    /// Accepts a bare array of objects, a wrapper object carrying a
    /// `listings` or `tabular_data` array, or a singleton object. Returns
    /// `None` for shapes that carry no records.
    pub fn from_structured(value: &serde_json::Value) -> Option<Self> {
        fn object_to_record(obj: &serde_json::Map<String, serde_json::Value>) -> Record {
            obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        }

        match value {
            serde_json::Value::Array(items) => {
                let records: Vec<Record> = items
                    .iter()
                    .filter_map(|v| v.as_object().map(object_to_record))
                    .collect();
                if records.is_empty() {
                    None
                } else {
                    Some(ScrapedContent::Records(records))
                }
            }
            serde_json::Value::Object(obj) => {
                for wrapper in ["listings", "tabular_data"] {
                    if let Some(serde_json::Value::Array(items)) = obj.get(wrapper) {
                        let records: Vec<Record> = items
                            .iter()
                            .filter_map(|v| v.as_object().map(object_to_record))
                            .collect();
                        if !records.is_empty() {
                            return Some(ScrapedContent::Records(records));
                        }
                    }
                }
                if obj.is_empty() {
                    None
                } else {
                    Some(ScrapedContent::Records(vec![object_to_record(obj)]))
                }
            }
            _ => None,
        }
    }
}

/// An ephemeral scored chunk reference produced by retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub content_key: String,
    pub ordinal: i64,
    pub text: String,
    /// Cosine similarity base score (0.0 in keyword-only mode).
    pub similarity: f32,
    /// Weighted keyword / phrase / header match bonus.
    pub keyword_bonus: f32,
    /// Length-damped final score used for ranking.
    pub combined: f32,
}

/// A citation attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub content_key: String,
    pub excerpt: String,
}

impl SourceRef {
    /// Build a source reference with the excerpt capped at `max_chars`.
    pub fn new(content_key: impl Into<String>, text: &str, max_chars: usize) -> Self {
        Self {
            content_key: content_key.into(),
            excerpt: text.chars().take(max_chars).collect(),
        }
    }
}
