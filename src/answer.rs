//! Query pipeline entry point.
//!
//! `AnswerEngine::answer` runs the full pipeline for one question:
//! classify intent, assemble context through the fallback cascade, take
//! the aggregation shortcut when it applies, and otherwise synthesize an
//! answer through the completion model. Every path returns a usable
//! `AnswerResponse`; provider trouble degrades the answer, it does not
//! surface as an error.

use std::sync::Arc;

use serde::Serialize;

use crate::aggregate;
use crate::chart::ChartSpec;
use crate::config::{Config, ProviderCredentials};
use crate::context::{AssembledContext, ContextAssembler, NO_DATA_MESSAGE};
use crate::embedding::{EmbeddingClient, EmbeddingGateway};
use crate::error::RagError;
use crate::intent::{classify, IntentCategory};
use crate::models::SourceRef;
use crate::store::Store;
use crate::synthesize::{CompletionClient, OpenAiCompletionClient, Synthesizer};

/// The answer to one question, with advisory cost and citations.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    /// Advisory USD estimate for the completion call; `0.0` for answers
    /// produced without one.
    pub cost_estimate: f64,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
}

impl AnswerResponse {
    fn fixed(answer: &str, sources: Vec<SourceRef>) -> Self {
        Self {
            answer: answer.to_string(),
            cost_estimate: 0.0,
            sources,
            chart: None,
        }
    }
}

/// Answers questions against one store.
pub struct AnswerEngine {
    store: Arc<dyn Store>,
    config: Config,
    embedding_override: Option<Arc<dyn EmbeddingClient>>,
    completion_override: Option<Arc<dyn CompletionClient>>,
}

impl AnswerEngine {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            config,
            embedding_override: None,
            completion_override: None,
        }
    }

    /// Replace the embedding backend (test seam).
    pub fn with_embedding_client(mut self, client: Arc<dyn EmbeddingClient>) -> Self {
        self.embedding_override = Some(client);
        self
    }

    /// Replace the completion backend (test seam).
    pub fn with_completion_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.completion_override = Some(client);
        self
    }

    /// Answer one question against a project's content.
    ///
    /// A project with no usable content gets the fixed no-data answer,
    /// not an error. An unknown project id is a caller bug (the project
    /// row is owned by an external collaborator) and returns
    /// [`RagError::EmptyCorpus`] instead.
    pub async fn answer(
        &self,
        project_id: &str,
        query: &str,
        credentials: &ProviderCredentials,
    ) -> Result<AnswerResponse, RagError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| RagError::EmptyCorpus(project_id.to_string()))?;

        let intent = classify(query);
        tracing::debug!(project = %project.id, category = ?intent.category, "answering query");

        let gateway = match &self.embedding_override {
            Some(client) => EmbeddingGateway::with_client(Arc::clone(client), &self.config.embedding),
            None => EmbeddingGateway::new(&self.config.embedding, credentials.api_key.as_deref()),
        };

        let assembler = ContextAssembler::new(&*self.store, &gateway, &self.config.retrieval);
        let context = assembler.assemble(&project, query).await?;

        let (text, sources) = match &context {
            AssembledContext::NoData => {
                return Ok(AnswerResponse::fixed(NO_DATA_MESSAGE, Vec::new()));
            }
            other => (
                other.text().unwrap_or_default().to_string(),
                other.sources().to_vec(),
            ),
        };

        if intent.category == IntentCategory::Aggregation {
            if let Some(aggregated) = aggregate::try_aggregate(query, &text) {
                tracing::debug!(entity = %aggregated.entity, "aggregation shortcut taken");
                return Ok(AnswerResponse::fixed(&aggregated.answer, sources));
            }
        }

        let configured_client = match (&self.completion_override, &credentials.api_key) {
            (Some(_), _) | (None, None) => None,
            (None, Some(key)) => Some(OpenAiCompletionClient::new(&self.config.completion, key)?),
        };
        let client: Option<&dyn CompletionClient> = self
            .completion_override
            .as_deref()
            .or(configured_client.as_ref().map(|c| c as &dyn CompletionClient));

        let synthesizer = Synthesizer::new(client, &self.config.completion);
        let output = synthesizer.synthesize(&intent, &text, query).await;

        Ok(AnswerResponse {
            answer: output.answer,
            cost_estimate: output.cost_estimate,
            sources,
            chart: output.chart,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Project, Session, SessionStatus};
    use crate::store::memory::InMemoryStore;
    use crate::synthesize::{Completion, NOT_CONFIGURED_MESSAGE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ScriptedCompletion {
        reply: String,
        calls: AtomicU64,
    }

    impl ScriptedCompletion {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletion {
        async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion {
                text: self.reply.clone(),
                prompt_tokens: Some(10),
                completion_tokens: Some(10),
            })
        }
    }

    async fn seed(store: &InMemoryStore, chunks: &[&str]) {
        store
            .put_project(&Project {
                id: "p1".to_string(),
                retrieval_enabled: true,
            })
            .await
            .unwrap();
        let mut session = Session::new("p1", "https://example.com");
        session.status = SessionStatus::Ingested;
        store.put_session(&session).await.unwrap();
        let rows: Vec<Chunk> = chunks
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk::new(&session.content_key, i as i64, *text))
            .collect();
        store.put_chunks(&session.content_key, &rows).await.unwrap();
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.embedding.dims = 16;
        config.embedding.batch_delay_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_unknown_project_is_error() {
        let store = Arc::new(InMemoryStore::new());
        let engine = AnswerEngine::new(store, config());
        let err = engine
            .answer("missing", "hello", &ProviderCredentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus(_)));
    }

    #[tokio::test]
    async fn test_empty_project_gets_no_data_message() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_project(&Project {
                id: "p1".to_string(),
                retrieval_enabled: true,
            })
            .await
            .unwrap();
        let completion = ScriptedCompletion::new("should not be called");
        let engine = AnswerEngine::new(store, config())
            .with_completion_client(completion.clone() as Arc<dyn CompletionClient>);
        let response = engine
            .answer("p1", "anything", &ProviderCredentials::default())
            .await
            .unwrap();
        assert_eq!(response.answer, NO_DATA_MESSAGE);
        assert_eq!(response.cost_estimate, 0.0);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_aggregation_skips_completion() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, &["France: 67000000\nSpain: 47000000"]).await;
        let completion = ScriptedCompletion::new("should not be called");
        let engine = AnswerEngine::new(store, config())
            .with_completion_client(completion.clone() as Arc<dyn CompletionClient>);

        let response = engine
            .answer(
                "p1",
                "which country has the highest population",
                &ProviderCredentials::default(),
            )
            .await
            .unwrap();

        assert!(response.answer.contains("France"));
        assert!(response.answer.contains("67000000"));
        assert_eq!(response.cost_estimate, 0.0);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_synthesized_answer_carries_sources_and_cost() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, &["capital: Lima\ncountry: Peru"]).await;
        let completion = ScriptedCompletion::new("The capital of Peru is Lima.");
        let engine = AnswerEngine::new(store, config())
            .with_completion_client(completion.clone() as Arc<dyn CompletionClient>);

        let response = engine
            .answer("p1", "what is the capital of Peru", &ProviderCredentials::default())
            .await
            .unwrap();

        assert!(response.answer.contains("Lima"));
        assert!(response.cost_estimate > 0.0);
        assert_eq!(response.sources.len(), 1);
        assert!(response.sources[0].excerpt.contains("Lima"));
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_credentials_and_no_override() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, &["capital: Lima\ncountry: Peru"]).await;
        let engine = AnswerEngine::new(store, config());

        let response = engine
            .answer("p1", "what is the capital of Peru", &ProviderCredentials::default())
            .await
            .unwrap();
        assert_eq!(response.answer, NOT_CONFIGURED_MESSAGE);
        assert_eq!(response.cost_estimate, 0.0);
    }

    #[tokio::test]
    async fn test_chart_intent_returns_structured_chart() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, &["France: 67\nSpain: 47"]).await;
        let reply = "```json\n{\"chart_type\": \"bar\", \"title\": \"Populations\", \
                     \"data\": {\"labels\": [\"France\", \"Spain\"], \"values\": [67, 47]}}\n```";
        let completion = ScriptedCompletion::new(reply);
        let engine = AnswerEngine::new(store, config())
            .with_completion_client(completion as Arc<dyn CompletionClient>);

        let response = engine
            .answer(
                "p1",
                "show a bar chart of populations",
                &ProviderCredentials::default(),
            )
            .await
            .unwrap();

        let chart = response.chart.expect("chart expected");
        assert_eq!(chart.title, "Populations");
        assert_eq!(chart.data.values, vec![67.0, 47.0]);
    }
}
