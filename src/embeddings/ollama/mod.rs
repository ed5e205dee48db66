
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::TicketError;
use crate::config::Config;
use crate::embeddings::EmbeddingProvider;

/// Output size of all-MiniLM-L6-v2, the model the ticket dataset was embedded with
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// A text and the vector Ollama produced for it
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// How a failed request should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Transient,
    Fatal,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            model: config.ollama.model.clone(),
            batch_size: config.ollama.batch_size.max(1),
            dimension: config.ollama.embedding_dimension as usize,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    /// Attempts per request, including the first; at least one
    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub const fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Check that the server answers and serves the configured model
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.validate_model().context("Model validation failed")?;

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Fail unless the configured model appears in the server's tag list
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;

        if models.iter().any(|m| same_model(&m.name, &self.model)) {
            debug!("Model {} is available", self.model);
            return Ok(());
        }

        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        warn!("Model {} not found. Available: {:?}", self.model, available);
        Err(anyhow::anyhow!(
            "Model '{}' is not available. Pull it with 'ollama pull {}'. Available models: {:?}",
            self.model,
            self.model,
            available
        ))
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response: ModelsResponse = self
            .get_json("/api/tags")
            .context("Failed to fetch models")?;

        debug!("Found {} models", response.models.len());
        Ok(response.models)
    }

    /// Embed a single text through `/api/embeddings`
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<EmbeddingResult> {
        debug!("Embedding text of {} bytes", text.len());

        let response: EmbedResponse = self
            .post_json(
                "/api/embeddings",
                &EmbedRequest {
                    model: &self.model,
                    prompt: text,
                },
            )
            .context("Failed to generate embedding")?;

        Ok(EmbeddingResult {
            text: text.to_string(),
            embedding: response.embedding,
        })
    }

    /// Embed many texts, `batch_size` at a time, preserving input order
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        let mut results = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size as usize) {
            let embeddings = self
                .embed_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            results.extend(embeddings);
        }

        debug!("Generated {} embeddings", results.len());
        Ok(results)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        if let [text] = texts {
            return Ok(vec![self.generate_embedding(text)?]);
        }

        let response: BatchEmbedResponse = self
            .post_json(
                "/api/embed",
                &BatchEmbedRequest {
                    model: &self.model,
                    input: texts,
                },
            )
            .context("Failed to generate batch embeddings")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Sent {} texts but received {} embeddings",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(texts
            .iter()
            .zip(response.embeddings)
            .map(|(text, embedding)| EmbeddingResult {
                text: text.clone(),
                embedding,
            })
            .collect())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let body = self.with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        serde_json::from_str(&body).with_context(|| format!("Invalid response from {}", path))
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_string(body).context("Failed to serialize request")?;

        let response = self.with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&payload)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        serde_json::from_str(&response).with_context(|| format!("Invalid response from {}", path))
    }

    /// Run `request` until it succeeds, fails fatally, or attempts run out.
    ///
    /// Server errors and transport failures are retried with exponential
    /// backoff; client errors are returned immediately.
    fn with_retry<F>(&self, mut request: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            let error = match request() {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            if classify(&error) == Failure::Fatal {
                warn!("Request to {} failed, not retrying: {}", self.base_url, error);
                return Err(anyhow::anyhow!("Request failed: {}", error));
            }

            if attempt >= self.retry_attempts {
                error!(
                    "All {} attempts failed for request to {}",
                    self.retry_attempts, self.base_url
                );
                return Err(anyhow::anyhow!(
                    "Request failed after {} attempts: {}",
                    attempt,
                    error
                ));
            }

            let delay = Duration::from_millis(EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000);
            warn!(
                "Attempt {}/{} failed ({}), retrying in {:?}",
                attempt, self.retry_attempts, error, delay
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

fn classify(error: &ureq::Error) -> Failure {
    match error {
        ureq::Error::StatusCode(status) if *status >= 500 => Failure::Transient,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => Failure::Transient,
        _ => Failure::Fatal,
    }
}

/// Ollama reports `name:latest` for models pulled without a tag
fn same_model(available: &str, wanted: &str) -> bool {
    let untagged = |name: &str| name.strip_suffix(":latest").unwrap_or(name).to_string();
    available == wanted || untagged(available) == untagged(wanted)
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    /// Runs the blocking HTTP call off the async workers
    async fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();

        let result = tokio::task::spawn_blocking(move || client.generate_embedding(&text))
            .await
            .map_err(|e| TicketError::EmbeddingUnavailable(format!("Embedding task failed: {}", e)))?
            .map_err(|e| TicketError::EmbeddingUnavailable(format!("{:#}", e)))?;

        if result.embedding.len() != self.dimension {
            return Err(TicketError::DimensionMismatch {
                expected: self.dimension,
                actual: result.embedding.len(),
            });
        }

        Ok(result.embedding)
    }
}
