//! # Sitesage
//!
//! The retrieval-augmented answering core for scraped web content.
//!
//! Sitesage takes content harvested from external pages, turns it into a
//! searchable set of text chunks, and answers natural-language questions
//! about that content by retrieving the most relevant chunks and handing
//! them to an external completion model.
//!
//! ## Architecture
//!
//! ```text
//! ingest:  ┌─────────┐   ┌───────────┐   ┌────────────┐
//!          │ Chunker │──▶│ Embedding │──▶│ chunk store │
//!          └─────────┘   │  gateway  │   └────────────┘
//!                        └───────────┘
//!
//! answer:  intent ──▶ retrieve ──▶ aggregate ──▶ context ──▶ synthesize
//!                       (hybrid)   (shortcut)    (cascade)   (completion)
//! ```
//!
//! Page fetching, project/URL management, authentication, and the durable
//! storage engine are external collaborators. Persistence is reached only
//! through the [`store::Store`] trait; the embedding and completion models
//! are reached through the [`embedding::EmbeddingClient`] and
//! [`synthesize::CompletionClient`] traits.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Storage abstraction + in-memory backend |
//! | [`chunk`] | Structured-record and paragraph chunking |
//! | [`embedding`] | Embedding providers and deterministic fallback |
//! | [`intent`] | Query intent classification |
//! | [`retrieve`] | Hybrid vector + keyword retrieval |
//! | [`aggregate`] | Superlative aggregation shortcut |
//! | [`context`] | Context assembly with fallback cascade |
//! | [`chart`] | Chart payload extraction and validation |
//! | [`synthesize`] | Completion calls and response shaping |
//! | [`ingest`] | Ingestion coordination |
//! | [`answer`] | Query pipeline entry point |

pub mod aggregate;
pub mod answer;
pub mod chart;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod intent;
pub mod models;
pub mod progress;
pub mod retrieve;
pub mod store;
pub mod synthesize;

pub use answer::{AnswerEngine, AnswerResponse};
pub use error::RagError;
pub use ingest::IngestionCoordinator;
