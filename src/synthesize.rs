//! Response synthesis through the external completion API.
//!
//! Each intent category selects one fixed system instruction; the chart
//! category instructs the model to emit only a fenced JSON object
//! matching the chart schema. Provider failures produce a fixed apology
//! with zero cost rather than an error; malformed chart payloads fall
//! back to the raw model text. Cost estimates derive from usage counts
//! when the provider reports them, otherwise from character counts —
//! advisory only, never authoritative.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chart::{self, ChartSpec};
use crate::config::CompletionConfig;
use crate::error::RagError;
use crate::intent::{IntentCategory, QueryIntent};

/// Approximate chars-per-token ratio used for advisory cost estimates.
const CHARS_PER_TOKEN: usize = 4;

/// Fixed message when the completion provider fails or times out.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I couldn't generate an answer just now. Please try again in a moment.";

/// Fixed message when no completion credentials are configured.
pub const NOT_CONFIGURED_MESSAGE: &str =
    "Answer generation is not configured. Add a completion API key to enable it.";

/// Completion result with optional provider-reported usage.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

/// Remote completion backend. Implemented by the OpenAI-compatible chat
/// client and by test mocks.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, RagError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// OpenAI-compatible chat completion client
/// (`POST {endpoint}/chat/completions`).
pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompletionClient {
    pub fn new(config: &CompletionConfig, api_key: &str) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, RagError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::ProviderUnavailable(format!("completion request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::ProviderUnavailable(format!(
                "completion API error {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::MalformedProviderResponse(format!("completion payload: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                RagError::MalformedProviderResponse("completion response had no choices".into())
            })?;

        Ok(Completion {
            text,
            prompt_tokens: parsed.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: parsed.usage.as_ref().map(|u| u.completion_tokens),
        })
    }
}

/// Synthesis result handed back to the answer pipeline.
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub answer: String,
    pub chart: Option<ChartSpec>,
    pub cost_estimate: f64,
}

/// Builds prompts, calls the completion client, and post-processes the
/// response according to intent.
pub struct Synthesizer<'a> {
    client: Option<&'a dyn CompletionClient>,
    config: &'a CompletionConfig,
}

impl<'a> Synthesizer<'a> {
    pub fn new(client: Option<&'a dyn CompletionClient>, config: &'a CompletionConfig) -> Self {
        Self { client, config }
    }

    pub async fn synthesize(
        &self,
        intent: &QueryIntent,
        context: &str,
        query: &str,
    ) -> SynthesisOutput {
        let client = match self.client {
            Some(c) => c,
            None => {
                return SynthesisOutput {
                    answer: NOT_CONFIGURED_MESSAGE.to_string(),
                    chart: None,
                    cost_estimate: 0.0,
                }
            }
        };

        let system = system_prompt(intent);
        let user = format!("Context:\n{context}\n\nQuestion: {query}");

        let completion = match client.complete(&system, &user).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("completion call failed: {e}");
                return SynthesisOutput {
                    answer: APOLOGY_MESSAGE.to_string(),
                    chart: None,
                    cost_estimate: 0.0,
                };
            }
        };

        let cost_estimate = self.estimate_cost(&system, &user, &completion);

        if intent.category == IntentCategory::Chart {
            match chart::extract_chart(&completion.text) {
                Some(spec) => {
                    return SynthesisOutput {
                        answer: chart::canonical_json(&spec),
                        chart: Some(spec),
                        cost_estimate,
                    };
                }
                None => {
                    tracing::debug!("chart extraction failed; returning raw text");
                    return SynthesisOutput {
                        answer: completion.text,
                        chart: None,
                        cost_estimate,
                    };
                }
            }
        }

        SynthesisOutput {
            answer: completion.text,
            chart: None,
            cost_estimate,
        }
    }

    fn estimate_cost(&self, system: &str, user: &str, completion: &Completion) -> f64 {
        let prompt_tokens = completion
            .prompt_tokens
            .unwrap_or(((system.len() + user.len()) / CHARS_PER_TOKEN) as u64);
        let completion_tokens = completion
            .completion_tokens
            .unwrap_or((completion.text.len() / CHARS_PER_TOKEN) as u64);

        prompt_tokens as f64 * self.config.prompt_rate_per_million / 1_000_000.0
            + completion_tokens as f64 * self.config.completion_rate_per_million / 1_000_000.0
    }
}

/// One fixed system instruction per intent category.
pub fn system_prompt(intent: &QueryIntent) -> String {
    let base = "You answer questions using only the provided context. \
                If the context does not contain the answer, say so plainly.";

    let shaping = match intent.category {
        IntentCategory::Chart => {
            let kind = intent
                .chart_kind
                .map(|k| k.as_str())
                .unwrap_or("bar");
            return format!(
                "{base} Respond with ONLY a JSON object inside a fenced code block and \
                 nothing else. The object must have the fields \"chart_type\" (\"{kind}\"), \
                 \"title\", \"description\", and \"data\" with \"labels\" and \"values\" \
                 arrays (optionally \"datasets\")."
            );
        }
        IntentCategory::Aggregation => {
            "State the single best-matching item and its exact number from the context."
        }
        IntentCategory::Comparison => {
            "Compare the items the question names, point by point, using only facts \
             from the context."
        }
        IntentCategory::Statistics => {
            "Answer with the exact count or figure derived from the context, then one \
             short supporting sentence."
        }
        IntentCategory::Summary => {
            "Summarize the context in at most four sentences, keeping concrete names \
             and numbers."
        }
        IntentCategory::List => {
            "List the matching items from the context as short bullet points."
        }
        IntentCategory::SpecificItem => {
            "Answer the question directly in one or two sentences, quoting exact \
             values from the context."
        }
        IntentCategory::Conversational => {
            "Reply briefly and helpfully, grounded in the context when it is relevant."
        }
    };

    let mut prompt = format!("{base} {shaping}");
    if intent.wants_price {
        prompt.push_str(" Quote prices exactly as they appear in the context, with currency.");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::classify;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ScriptedClient {
        reply: String,
        calls: AtomicU64,
    }

    impl ScriptedClient {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion {
                text: self.reply.clone(),
                prompt_tokens: Some(100),
                completion_tokens: Some(50),
            })
        }
    }

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, RagError> {
            Err(RagError::ProviderUnavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_provider_failure_yields_apology() {
        let config = CompletionConfig::default();
        let client = FailingClient;
        let synth = Synthesizer::new(Some(&client), &config);
        let out = synth
            .synthesize(&classify("what is this"), "some context", "what is this")
            .await;
        assert_eq!(out.answer, APOLOGY_MESSAGE);
        assert_eq!(out.cost_estimate, 0.0);
    }

    #[tokio::test]
    async fn test_missing_client_yields_not_configured() {
        let config = CompletionConfig::default();
        let synth = Synthesizer::new(None, &config);
        let out = synth
            .synthesize(&classify("what is this"), "context", "what is this")
            .await;
        assert_eq!(out.answer, NOT_CONFIGURED_MESSAGE);
    }

    #[tokio::test]
    async fn test_chart_intent_canonicalizes_payload() {
        let reply = "```json\n{\"chart_type\": \"bar\", \"title\": \"T\", \
                     \"data\": {\"values\": [1, 2]}}\n```";
        let client = ScriptedClient::new(reply);
        let config = CompletionConfig::default();
        let synth = Synthesizer::new(Some(&client), &config);
        let out = synth
            .synthesize(&classify("chart of sales"), "ctx", "chart of sales")
            .await;
        let spec = out.chart.expect("chart should be extracted");
        assert_eq!(spec.data.labels, vec!["Item 1", "Item 2"]);
        // Answer is the canonical serialization, not the fenced original
        assert!(!out.answer.contains("```"));
        assert!(out.answer.contains("\"chart_type\""));
    }

    #[tokio::test]
    async fn test_invalid_chart_returns_raw_text() {
        // Missing the required "data" field
        let reply = "```json\n{\"chart_type\": \"bar\", \"title\": \"T\"}\n```";
        let client = ScriptedClient::new(reply);
        let config = CompletionConfig::default();
        let synth = Synthesizer::new(Some(&client), &config);
        let out = synth
            .synthesize(&classify("chart of sales"), "ctx", "chart of sales")
            .await;
        assert!(out.chart.is_none());
        assert_eq!(out.answer, reply);
    }

    #[tokio::test]
    async fn test_cost_uses_reported_usage() {
        let client = ScriptedClient::new("hi");
        let config = CompletionConfig::default();
        let synth = Synthesizer::new(Some(&client), &config);
        let out = synth
            .synthesize(&classify("hello there"), "ctx", "hello there")
            .await;
        let expected = 100.0 * config.prompt_rate_per_million / 1_000_000.0
            + 50.0 * config.completion_rate_per_million / 1_000_000.0;
        assert!((out.cost_estimate - expected).abs() < 1e-12);
    }

    #[test]
    fn test_chart_prompt_names_requested_kind() {
        let intent = classify("pie chart of sales");
        let prompt = system_prompt(&intent);
        assert!(prompt.contains("\"pie\""));
        assert!(prompt.contains("fenced"));
    }

    #[test]
    fn test_each_category_has_distinct_prompt() {
        let prompts: Vec<String> = [
            "chart of x",
            "highest value",
            "compare a and b",
            "how many items",
            "summarize this",
            "list all items",
            "what is the name",
            "hello",
        ]
        .iter()
        .map(|q| system_prompt(&classify(q)))
        .collect();
        for (i, a) in prompts.iter().enumerate() {
            for b in prompts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
