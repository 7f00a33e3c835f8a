//! LLM client: chat completions and embeddings over Ollama or an
//! OpenAI-compatible API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use affinity_core::behavior::Behavior;
use affinity_core::config::LlmConfig;
use affinity_core::extraction::strip_code_fence;
use affinity_core::{AffinityError, ChatMessage, Classifier, Embedder, Generator, PromptEngine, PromptId, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse, SentimentResponse};

const RETRY_BASE_MS: u64 = 200;
const RETRY_CAP_MS: u64 = 10_000;

/// Sleep before retry number `attempt` (1-based): doubling from 200 ms,
/// capped at 10 s.
#[must_use]
pub fn retry_backoff(attempt: u32) -> Duration {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(RETRY_BASE_MS.saturating_mul(factor).min(RETRY_CAP_MS))
}

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API.
    OpenAiCompatible {
        /// API root without the `/v1` suffix.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend: every call fails and callers use their fallbacks.
    None,
}

/// Routes requests to the configured backend with retries.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    embedding_model: String,
    max_retries: u32,
    timeout_ms: u64,
    temperature: f32,
}

impl LlmClient {
    /// Create a client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            embedding_model: embedding_model.into(),
            max_retries: defaults.max_retries,
            timeout_ms: defaults.request_timeout_ms,
            temperature: defaults.temperature,
        }
    }

    /// Build a client from the `[llm]` config section.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] for an unknown provider or an
    /// OpenAI-compatible provider without an API key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let provider = match config.provider.as_str() {
            "ollama" => LlmProvider::Ollama { base_url },
            "openai" => LlmProvider::OpenAiCompatible {
                base_url,
                api_key: config
                    .api_key
                    .clone()
                    .ok_or_else(|| LlmError::ConfigError("openai provider requires api_key".into()))?,
            },
            "none" => LlmProvider::None,
            other => return Err(LlmError::ConfigError(format!("unknown provider '{other}'"))),
        };
        Ok(Self {
            max_retries: config.max_retries,
            timeout_ms: config.request_timeout_ms,
            temperature: config.temperature,
            ..Self::new(provider, &config.model, &config.embedding_model)
        })
    }

    /// A client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, "", "")
    }

    /// Set retries after the first failed attempt.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Run a chat completion.
    ///
    /// # Errors
    /// Returns [`LlmError::Unavailable`] without a backend, or the last
    /// failure once retries are exhausted.
    pub async fn chat(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let temperature = request.temperature.unwrap_or(self.temperature);
        let (url, body, api_key) = match &self.provider {
            LlmProvider::None => return Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let mut body = json!({
                    "model": self.model,
                    "messages": wire_messages(&request.system, &request.messages),
                    "stream": false,
                    "options": { "temperature": temperature },
                });
                if let Some(max) = request.max_tokens {
                    body["options"]["num_predict"] = json!(max);
                }
                if request.json_mode {
                    body["format"] = json!("json");
                }
                (format!("{base_url}/api/chat"), body, None)
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let mut body = json!({
                    "model": self.model,
                    "messages": wire_messages(&request.system, &request.messages),
                    "temperature": temperature,
                });
                if let Some(max) = request.max_tokens {
                    body["max_tokens"] = json!(max);
                }
                if request.json_mode {
                    body["response_format"] = json!({ "type": "json_object" });
                }
                (format!("{base_url}/v1/chat/completions"), body, Some(api_key.as_str()))
            }
        };

        let (json, latency_ms) = self.post_with_retries(&url, &body, api_key).await?;
        let (text, tokens) = if api_key.is_some() {
            (
                json["choices"][0]["message"]["content"].as_str(),
                json["usage"]["completion_tokens"].as_u64(),
            )
        } else {
            (json["message"]["content"].as_str(), json["eval_count"].as_u64())
        };
        let text = text
            .ok_or_else(|| LlmError::ParseError("response has no message content".into()))?
            .trim()
            .to_string();

        debug!(model = %self.model, latency_ms, chars = text.len(), "Chat completion");
        Ok(LlmResponse {
            text,
            tokens_generated: u32::try_from(tokens.unwrap_or(0)).unwrap_or(u32::MAX),
            latency_ms,
            model: self.model.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Embeddings
    // -----------------------------------------------------------------------

    /// Embed one text.
    ///
    /// # Errors
    /// Same as [`LlmClient::chat`]; an empty vector is a parse error.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let (url, body, api_key, pointer) = match &self.provider {
            LlmProvider::None => return Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => (
                format!("{base_url}/api/embeddings"),
                json!({ "model": self.embedding_model, "prompt": text }),
                None,
                "/embedding",
            ),
            LlmProvider::OpenAiCompatible { base_url, api_key } => (
                format!("{base_url}/v1/embeddings"),
                json!({ "model": self.embedding_model, "input": text }),
                Some(api_key.as_str()),
                "/data/0/embedding",
            ),
        };

        let (json, _) = self.post_with_retries(&url, &body, api_key).await?;
        let values = json
            .pointer(pointer)
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::ParseError("response has no embedding".into()))?;
        #[allow(clippy::cast_possible_truncation)]
        let embedding: Vec<f32> = values.iter().filter_map(Value::as_f64).map(|v| v as f32).collect();
        if embedding.is_empty() {
            return Err(LlmError::ParseError("empty embedding".into()));
        }
        Ok(embedding)
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    async fn post_with_retries(&self, url: &str, body: &Value, api_key: Option<&str>) -> Result<(Value, u64), LlmError> {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt = attempt + 1, of = self.max_retries + 1, "Retrying LLM call");
                tokio::time::sleep(retry_backoff(attempt)).await;
            }

            let start = Instant::now();
            let mut builder = self
                .http
                .post(url)
                .json(body)
                .timeout(Duration::from_millis(self.timeout_ms));
            if let Some(key) = api_key {
                builder = builder.bearer_auth(key);
            }
            let result = builder.send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            let err = match result {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Value>()
                        .await
                        .map(|json| (json, latency_ms))
                        .map_err(|e| LlmError::ParseError(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status();
                    LlmError::RequestFailed(format!("HTTP {status}: {}", resp.text().await.unwrap_or_default()))
                }
                Err(e) if e.is_timeout() => LlmError::Timeout(self.timeout_ms),
                Err(e) => LlmError::from(e),
            };
            warn!(url, attempt = attempt + 1, error = %err, "LLM call failed");
            if !err.is_retryable() {
                return Err(err);
            }
            last_error = err.to_string();
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

fn wire_messages(system: &str, messages: &[ChatMessage]) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        wire.push(json!({ "role": "system", "content": system }));
    }
    for m in messages {
        let role = match m.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        wire.push(json!({ "role": role, "content": m.content }));
    }
    wire
}

#[async_trait]
impl Generator for LlmClient {
    async fn generate(&self, system: &str, messages: &[ChatMessage]) -> affinity_core::Result<String> {
        let request = LlmRequest::new(system, messages.to_vec());
        Ok(self.chat(&request).await?.text)
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> affinity_core::Result<Vec<f32>> {
        self.embed_text(text)
            .await
            .map_err(|e| AffinityError::Embedding(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Read the sentiment label from classifier output.
///
/// Unparseable output and unknown labels are neutral.
#[must_use]
pub fn parse_sentiment(raw: &str) -> Behavior {
    let body = strip_code_fence(raw);
    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if end > start => &body[start..=end],
        _ => return Behavior::Neutral,
    };
    serde_json::from_str::<SentimentResponse>(json)
        .map_or(Behavior::Neutral, |r| Behavior::from_label(&r.sentiment))
}

/// Behavior classification through the chat endpoint in JSON mode.
#[derive(Debug, Clone)]
pub struct LlmClassifier {
    client: Arc<LlmClient>,
    prompts: Arc<PromptEngine>,
    persona: String,
}

impl LlmClassifier {
    /// Classify with `client`, rendering the classify prompt for `persona`.
    #[must_use]
    pub fn new(client: Arc<LlmClient>, prompts: Arc<PromptEngine>, persona: impl Into<String>) -> Self {
        Self {
            client,
            prompts,
            persona: persona.into(),
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str) -> affinity_core::Result<Behavior> {
        let request = LlmRequest::from_prompt(
            &self.prompts,
            PromptId::Classify,
            &[("persona", &self.persona), ("text", text)],
        )
        .map_err(|e| AffinityError::Classification(e.to_string()))?
        .json();
        let response = self
            .client
            .chat(&request)
            .await
            .map_err(|e| AffinityError::Classification(e.to_string()))?;
        Ok(parse_sentiment(&response.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_parsing() {
        assert_eq!(parse_sentiment(r#"{"sentiment": "compliment"}"#), Behavior::Compliment);
        assert_eq!(parse_sentiment("```json\n{\"sentiment\": \"rude\"}\n```"), Behavior::Rude);
        assert_eq!(parse_sentiment(r#"{"sentiment": "ecstatic"}"#), Behavior::Neutral);
        assert_eq!(parse_sentiment("compliment"), Behavior::Neutral);
    }

    #[test]
    fn wire_messages_lead_with_system() {
        let wire = wire_messages("be nice", &[ChatMessage::user("hi"), ChatMessage::assistant("hey")]);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["role"], "assistant");
        assert_eq!(wire_messages("", &[ChatMessage::user("hi")]).len(), 1);
    }

    #[test]
    fn config_selects_provider() {
        let mut config = LlmConfig::default();
        assert!(LlmClient::from_config(&config).expect("ollama").is_available());

        config.provider = "openai".into();
        assert!(matches!(LlmClient::from_config(&config), Err(LlmError::ConfigError(_))));
        config.api_key = Some("sk-test".into());
        assert!(LlmClient::from_config(&config).is_ok());

        config.provider = "none".into();
        assert!(!LlmClient::from_config(&config).expect("none").is_available());
        config.provider = "carrier-pigeon".into();
        assert!(LlmClient::from_config(&config).is_err());
    }

    #[test]
    fn retry_backoff_doubles_then_caps() {
        assert_eq!(retry_backoff(1), Duration::from_millis(200));
        assert_eq!(retry_backoff(2), Duration::from_millis(400));
        assert_eq!(retry_backoff(4), Duration::from_millis(1600));
        assert_eq!(retry_backoff(60), Duration::from_secs(10));
        assert_eq!(retry_backoff(u32::MAX), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn no_backend_fails_fast() {
        let client = LlmClient::none();
        let err = client.chat(&LlmRequest::new("s", vec![])).await.expect_err("no backend");
        assert!(matches!(err, LlmError::Unavailable(_)));
        assert!(matches!(
            Embedder::embed(&client, "x").await,
            Err(AffinityError::Embedding(_))
        ));
    }
}
