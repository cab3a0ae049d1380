//! Error taxonomy for the answering core.
//!
//! Provider-facing failures are translated into one of these variants at
//! the component boundary. Most of them are recovered locally (embedding
//! fallback, fixed apology message, raw-text passthrough); only
//! [`RagError::IngestionConsistencyViolation`] is surfaced to callers of
//! `ingest` as a hard failure.

use thiserror::Error;

/// Errors that can occur in the ingestion and answering pipeline.
#[derive(Error, Debug)]
pub enum RagError {
    /// An embedding or completion call failed or timed out. Always
    /// recovered locally via a fallback path, never a hard failure.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The project is unknown, or no content of any kind exists for it.
    #[error("no answerable content for project {0}")]
    EmptyCorpus(String),

    /// A provider returned a payload that could not be parsed.
    #[error("malformed provider response: {0}")]
    MalformedProviderResponse(String),

    /// A chunk write would have mixed stale and fresh data for one
    /// content key. Fatal to the ingestion call that detects it.
    #[error("ingestion consistency violation: {0}")]
    IngestionConsistencyViolation(String),

    /// No credentials were supplied for a capability with no fallback.
    #[error("provider configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
