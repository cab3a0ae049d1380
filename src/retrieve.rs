//! Hybrid vector + keyword retrieval over a project's chunk pool.
//!
//! Eligibility is scoped to sessions in the `ingested` state, so chunks
//! belonging to superseded or in-flight sessions are never ranked. Each
//! chunk gets a combined score: a cosine-similarity base (when the query
//! and chunk vectors share an origin class) plus weighted keyword bonuses
//! (exact query phrase > header-line hits > adjacent keyword pairs >
//! single keywords), damped by chunk length so very long chunks are not
//! unfairly favored. Candidates below the relevance floor are dropped,
//! and ties break on original chunk ordinal to keep retrieval
//! deterministic.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, Embedded, EmbeddingGateway};
use crate::error::RagError;
use crate::models::{Chunk, RetrievalCandidate, SessionStatus};
use crate::store::Store;

/// Tokens that carry no retrieval signal.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "been", "have", "has", "had", "this", "that",
    "these", "those", "with", "from", "into", "about", "what", "which", "when", "where", "who",
    "whom", "why", "how", "does", "did", "can", "could", "will", "would", "should", "there",
    "their", "they", "them", "its", "his", "her", "our", "your", "you", "all", "any", "each",
    "more", "most", "some", "such", "than", "then", "out", "not", "but", "per", "many", "much",
];

/// Small domain synonym table applied during keyword extraction.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("price", &["cost", "pricing"]),
    ("cost", &["price", "pricing"]),
    ("pricing", &["price", "cost"]),
    ("buy", &["purchase", "order"]),
    ("purchase", &["buy", "order"]),
    ("image", &["photo", "picture"]),
    ("photo", &["image", "picture"]),
    ("product", &["item", "listing"]),
    ("item", &["product", "listing"]),
    ("city", &["town"]),
    ("phone", &["telephone", "contact"]),
    ("email", &["mail", "contact"]),
];

static SIMPLE_QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(what|who|when|where|which|how\s+(many|much))\b").unwrap()
});

/// Extracted query keywords: the ordered surface tokens (for adjacency
/// checks) and the expanded set including proper nouns and synonyms.
#[derive(Debug, Clone)]
pub struct QueryKeywords {
    pub ordered: Vec<String>,
    pub expanded: Vec<String>,
}

/// Extract lower-cased keywords from a query: stop-words removed, tokens
/// longer than two characters, proper nouns retained, plus synonym
/// expansions.
pub fn extract_keywords(query: &str) -> QueryKeywords {
    let mut ordered: Vec<String> = Vec::new();

    for token in query.split(|c: char| !c.is_alphanumeric()) {
        let lower = token.to_lowercase();
        if lower.len() > 2 && !STOP_WORDS.contains(&lower.as_str()) && !ordered.contains(&lower) {
            ordered.push(lower);
        }
    }

    // Proper nouns keep their (case-insensitive) form even when short or
    // stop-listed, since they usually name the entity being asked about.
    let mut expanded = ordered.clone();
    for token in query.split_whitespace() {
        let cleaned: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.len() > 1 && cleaned.chars().next().is_some_and(|c| c.is_uppercase()) {
            let lower = cleaned.to_lowercase();
            if !expanded.contains(&lower) {
                expanded.push(lower);
            }
        }
    }

    for (word, alternates) in SYNONYMS {
        if expanded.iter().any(|k| k == word) {
            for alt in *alternates {
                let alt = alt.to_string();
                if !expanded.contains(&alt) {
                    expanded.push(alt);
                }
            }
        }
    }

    QueryKeywords { ordered, expanded }
}

/// Pick `k` from the question shape: factual interrogatives get a wider
/// net, open-ended prompts a narrower one.
pub fn choose_k(query: &str, config: &RetrievalConfig) -> usize {
    if SIMPLE_QUESTION_RE.is_match(&query.to_lowercase()) {
        config.top_k_simple
    } else {
        config.top_k_open
    }
}

/// Weighted keyword bonus for one chunk.
pub fn keyword_bonus(
    query: &str,
    keywords: &QueryKeywords,
    text: &str,
    config: &RetrievalConfig,
) -> f32 {
    let text_lower = text.to_lowercase();
    let query_lower = query.trim().to_lowercase();
    let mut bonus = 0.0f32;

    if !query_lower.is_empty() && text_lower.contains(&query_lower) {
        bonus += config.exact_phrase_weight;
    }

    for pair in keywords.ordered.windows(2) {
        let phrase = format!("{} {}", pair[0], pair[1]);
        if text_lower.contains(&phrase) {
            bonus += config.pair_phrase_weight;
        }
    }

    let matched = keywords
        .expanded
        .iter()
        .filter(|k| text_lower.contains(k.as_str()))
        .count();
    bonus += matched as f32 * config.keyword_weight;

    for line in text.lines() {
        if is_header_line(line) {
            let line_lower = line.to_lowercase();
            if keywords.expanded.iter().any(|k| line_lower.contains(k.as_str())) {
                bonus += config.header_weight;
            }
        }
    }

    bonus
}

/// A line that names an entity: a markdown heading, a bold lead-in, or a
/// short trailing-colon label.
fn is_header_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed.starts_with('#')
        || trimmed.starts_with("**")
        || (trimmed.len() <= 80 && trimmed.ends_with(':'))
}

/// Hybrid retriever over the chunk store.
pub struct Retriever<'a> {
    store: &'a dyn Store,
    gateway: &'a EmbeddingGateway,
    config: &'a RetrievalConfig,
}

impl<'a> Retriever<'a> {
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

    /// Content keys eligible for retrieval: sessions in `ingested` state.
    pub async fn eligible_keys(&self, project_id: &str) -> Result<Vec<String>, RagError> {
        let sessions = self.store.list_sessions(project_id).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| s.status == SessionStatus::Ingested)
            .map(|s| s.content_key)
            .collect())
    }

    /// Rank the project's chunks against the query and return the top
    /// `k` (k derived from the question shape).
    pub async fn retrieve(
        &self,
        project_id: &str,
        query: &str,
    ) -> Result<Vec<RetrievalCandidate>, RagError> {
        let keys = self.eligible_keys(project_id).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.store.chunks_for_keys(&keys).await?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let keywords = extract_keywords(query);
        let query_embedded = self.gateway.embed_query(query).await;

        let mut candidates: Vec<RetrievalCandidate> = chunks
            .iter()
            .map(|chunk| self.score_chunk(chunk, query, &keywords, &query_embedded))
            .filter(|c| c.combined >= self.config.relevance_floor)
            .collect();

        candidates.sort_by(|a, b| {
            b.combined
                .partial_cmp(&a.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.content_key.cmp(&b.content_key))
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });

        let k = choose_k(query, self.config);
        candidates.truncate(k);

        tracing::debug!(
            project = project_id,
            candidates = candidates.len(),
            k,
            "retrieval complete"
        );
        Ok(candidates)
    }

    fn score_chunk(
        &self,
        chunk: &Chunk,
        query: &str,
        keywords: &QueryKeywords,
        query_embedded: &Embedded,
    ) -> RetrievalCandidate {
        // Cosine base only when both vectors come from the same origin
        // class; a provider query vector against fallback chunk vectors
        // (or vice versa) is keyword-only.
        let similarity = match (&chunk.vector, chunk.vector_origin) {
            (Some(vector), Some(origin)) if origin == query_embedded.origin => {
                cosine_similarity(&query_embedded.vector, vector).max(0.0)
            }
            _ => 0.0,
        };

        let bonus = keyword_bonus(query, keywords, &chunk.text, self.config);
        let damping = length_damping(chunk.text.len(), self.config.length_damping_chars);
        let combined = (similarity + bonus) * damping;

        RetrievalCandidate {
            content_key: chunk.content_key.clone(),
            ordinal: chunk.ordinal,
            text: chunk.text.clone(),
            similarity,
            keyword_bonus: bonus,
            combined,
        }
    }
}

/// Damping factor in `(0, 1]`: 1.0 for short chunks, 0.5 at the
/// configured halving length.
fn length_damping(chars: usize, halving_chars: usize) -> f32 {
    if halving_chars == 0 {
        return 1.0;
    }
    let ratio = chars as f32 / halving_chars as f32;
    1.0 / (1.0 + ratio)
}
