//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a prompt to an LLM and get a reply back,
//! either as a complete message or as a stream of fragments.
//!
//! Implementations: OpenAI-compatible endpoints (OpenAI, OpenRouter, Ollama).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini", "llama3:latest")
    pub model: String,

    /// The prompt messages: system preamble, replayed memory, new user turn
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics, when the backend reports them
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Whether a token count came from the provider or from a length heuristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageAccuracy {
    /// Counts reported by the provider; billing-grade.
    #[default]
    Exact,
    /// Counts approximated from text length; not billing-grade.
    Estimated,
}

impl UsageAccuracy {
    /// Combine two accuracies: any estimate taints the sum.
    pub fn merge(self, other: Self) -> Self {
        if self == Self::Estimated || other == Self::Estimated {
            Self::Estimated
        } else {
            Self::Exact
        }
    }
}

/// Normalized token usage for one model invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub accuracy: UsageAccuracy,
}

impl Usage {
    /// Provider-reported usage.
    pub fn exact(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            accuracy: UsageAccuracy::Exact,
        }
    }

    /// Heuristic usage.
    pub fn estimated(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            accuracy: UsageAccuracy::Estimated,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Capability: anything that can report the token usage of an invocation.
///
/// Missing metadata normalizes to zero exact tokens rather than an error.
pub trait UsageReporting {
    fn usage(&self) -> Usage;
}

impl UsageReporting for ProviderResponse {
    fn usage(&self) -> Usage {
        self.usage.unwrap_or_default()
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings (e.g., "text-embedding-3-small").
    pub model: String,

    /// The texts to embed.
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vectors, one per input text.
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used.
    pub model: String,
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The dispatch loop calls
/// `complete()` or `stream()` without knowing which backend is bound to the
/// session.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.message.content),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support embeddings",
            self.name()
        )))
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// A provider plus the generation settings a session is bound to.
///
/// Cloning shares the underlying client.
#[derive(Clone)]
pub struct ModelBinding {
    pub provider: Arc<dyn Provider>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelBinding {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Build a request for this binding.
    pub fn request(&self, messages: Vec<Message>, stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
            stop: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Produces the model binding for a newly created session.
pub type ModelFactory = Arc<dyn Fn() -> ModelBinding + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(last),
                usage: Some(Usage::exact(3, 4)),
                model: request.model,
            })
        }
    }

    fn request(text: &str) -> ProviderRequest {
        ProviderRequest {
            model: "echo-1".into(),
            messages: vec![Message::user(text)],
            temperature: default_temperature(),
            max_tokens: None,
            stream: true,
            stop: vec![],
        }
    }

    #[test]
    fn missing_usage_reports_zero_exact() {
        let response = ProviderResponse {
            message: Message::assistant("hi"),
            usage: None,
            model: "m".into(),
        };
        let usage = response.usage();
        assert_eq!(usage.total_tokens(), 0);
        assert_eq!(usage.accuracy, UsageAccuracy::Exact);
    }

    #[test]
    fn estimate_taints_merged_accuracy() {
        assert_eq!(
            UsageAccuracy::Exact.merge(UsageAccuracy::Estimated),
            UsageAccuracy::Estimated
        );
        assert_eq!(
            UsageAccuracy::Exact.merge(UsageAccuracy::Exact),
            UsageAccuracy::Exact
        );
    }

    #[tokio::test]
    async fn default_stream_wraps_complete_as_single_chunk() {
        let mut rx = Echo.stream(request("ping")).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("ping"));
        assert!(chunk.done);
        assert_eq!(chunk.usage, Some(Usage::exact(3, 4)));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn binding_builds_requests_with_its_settings() {
        let binding = ModelBinding::new(Arc::new(Echo), "echo-1")
            .with_temperature(0.1)
            .with_max_tokens(64);
        let req = binding.request(vec![Message::user("x")], false);
        assert_eq!(req.model, "echo-1");
        assert_eq!(req.max_tokens, Some(64));
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
        assert!(!req.stream);
        assert!(format!("{binding:?}").contains("echo"));
    }

    #[tokio::test]
    async fn embeddings_unsupported_by_default() {
        let err = Echo
            .embed(EmbeddingRequest {
                model: "e".into(),
                inputs: vec!["x".into()],
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("echo"));
    }
}
