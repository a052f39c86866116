//! OpenAI-compatible HTTP client
//!
//! Provides async access to:
//! - Chat completions (answer generation)
//! - Embeddings (query and passage vectors)
//! - Rate limit handling with exponential backoff

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::traits::{Embedder, TextGenerator};
use super::types::{
    ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, LlmResponse, Message,
};

/// Maximum number of attempts for rate-limited requests
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 1000;

/// Which API a request went to; decides how failures are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Chat,
    Embeddings,
}

impl Endpoint {
    fn path(&self) -> &'static str {
        match self {
            Endpoint::Chat => "chat/completions",
            Endpoint::Embeddings => "embeddings",
        }
    }

    fn failure(&self, message: String) -> Error {
        match self {
            Endpoint::Chat => Error::GenerationFailed(message),
            Endpoint::Embeddings => Error::EmbeddingFailed(message),
        }
    }
}

/// Client for chat completions and embeddings
///
/// Cheap to clone; implements both [`Embedder`] and [`TextGenerator`].
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: String,
    base_url: String,
    embedding_dimensions: Option<usize>,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.config.chat_model)
            .field("embedding_model", &self.config.embedding_model)
            .finish()
    }
}

/// Builder for creating an LlmClient
#[derive(Default)]
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    embedding_dimensions: Option<usize>,
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the configured base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Ask the embeddings endpoint for vectors of this size
    pub fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = Some(dimensions);
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let config = self.config.unwrap_or_default();
        let api_key = self
            .api_key
            .or_else(|| config.resolved_api_key().ok().flatten())
            .ok_or_else(|| {
                Error::ConfigError(
                    "API key is required. Set ARLEARN_API_KEY or OPENAI_API_KEY.".to_string(),
                )
            })?;

        let timeout_secs = self.timeout_secs.unwrap_or(config.timeout_secs);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| config.base_url.clone())
            .trim_end_matches('/')
            .to_string();

        Ok(LlmClient {
            http_client,
            config,
            api_key,
            base_url,
            embedding_dimensions: self.embedding_dimensions,
        })
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        LlmClientBuilder::new()
            .config(config)
            .api_key(api_key)
            .build()
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    pub fn chat_model(&self) -> &str {
        &self.config.chat_model
    }

    pub fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    /// Make a chat completion request with the configured model
    pub async fn complete(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        let request = ChatRequest::new(&self.config.chat_model, messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response: ChatResponse = self.post_with_retry(Endpoint::Chat, &request).await?;
        let response = LlmResponse::from_chat_response(response)
            .ok_or_else(|| Error::GenerationFailed("Empty response from API".to_string()))?;

        info!(
            model = %response.model,
            tokens = response.tokens_used,
            finish_reason = ?response.finish_reason,
            "Chat completion successful"
        );
        Ok(response)
    }

    /// Embed a single text
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_texts(vec![text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingFailed("Empty embedding response".to_string()))
    }

    /// Embed a batch of texts, preserving order
    pub async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let mut request = if expected == 1 {
            EmbeddingRequest::new(&self.config.embedding_model, texts.concat())
        } else {
            EmbeddingRequest::batch(&self.config.embedding_model, texts)
        };
        if let Some(dimensions) = self.embedding_dimensions {
            request = request.with_dimensions(dimensions);
        }

        debug!(model = %request.model, inputs = expected, "Sending embedding request");

        let response: EmbeddingResponse =
            self.post_with_retry(Endpoint::Embeddings, &request).await?;
        let vectors = response.into_vectors();

        if vectors.len() != expected {
            return Err(Error::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                expected,
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    /// POST with retry on rate limiting
    async fn post_with_retry<Req, Resp>(&self, endpoint: Endpoint, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.post(endpoint, body).await {
                Err(Error::RateLimited(wait_secs)) if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = calculate_backoff(attempts, wait_secs);
                    warn!(
                        endpoint = endpoint.path(),
                        attempt = attempts,
                        wait_ms = backoff,
                        "Rate limited, retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                result => return result,
            }
        }
    }

    /// Send a single request to the API
    async fn post<Req, Resp>(&self, endpoint: Endpoint, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint.path());

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();

        if !status.is_success() {
            let header_wait = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(endpoint, status.as_u16(), &body, header_wait));
        }

        response
            .json()
            .await
            .map_err(|e| endpoint.failure(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_texts(texts.to_vec()).await
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.complete(vec![Message::user(prompt)]).await?;
        Ok(response.content)
    }
}

/// Map a non-success status to an error
fn status_error(endpoint: Endpoint, status: u16, body: &str, header_wait: Option<u64>) -> Error {
    match status {
        401 => endpoint.failure(
            "Unauthorized: Invalid API key. Set ARLEARN_API_KEY or OPENAI_API_KEY environment variable."
                .to_string(),
        ),
        429 => {
            let wait_secs = header_wait.or_else(|| extract_retry_after(body)).unwrap_or(60);
            Error::RateLimited(wait_secs)
        }
        400 => endpoint.failure(format!("Bad request: {}", body)),
        403 => endpoint.failure(format!("Forbidden: {}", body)),
        404 => endpoint.failure(format!("Model not found or endpoint unavailable: {}", body)),
        500..=599 => endpoint.failure(format!("Server error ({}): {}", status, body)),
        _ => endpoint.failure(format!("HTTP error {}: {}", status, body)),
    }
}

/// Calculate backoff delay with jitter
fn calculate_backoff(attempt: u32, suggested_wait: u64) -> u64 {
    let base = BACKOFF_BASE_MS * 2u64.pow(attempt.saturating_sub(1));
    let max_wait = suggested_wait * 1000;

    // Use the larger of calculated backoff or suggested wait
    let delay = base.max(max_wait);

    let jitter = delay / 10;
    delay + (rand_jitter() % jitter.max(1))
}

fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64 % 1000)
        .unwrap_or(0)
}

/// Extract retry-after value from an error body
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            json.get("error")
                .and_then(|error| error.get("retry_after"))
                .and_then(|v| v.as_u64())
        })
}
