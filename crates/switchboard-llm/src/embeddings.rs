//! Embeddings support for semantic similarity search.
//!
//! The [`Embedder`] trait converts text into dense vectors; the vector
//! facade crate consumes it for similarity search.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    ///
    /// Default implementation calls `embed` sequentially; implementations
    /// may override with a batched call.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;

    /// Name of this embedder.
    fn name(&self) -> &str;
}

/// An embedder that can be shared across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Similarity Metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Cosine similarity between two vectors, in [-1, 1].
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Euclidean distance between two vectors.
///
/// Returns `f32::INFINITY` for mismatched lengths.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// A mock embedder producing deterministic unit vectors.
///
/// The same text always embeds to the same vector, which makes similarity
/// search testable without a provider.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

#[cfg(any(test, feature = "testing"))]
impl MockEmbedder {
    /// Create a mock embedder with the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut state = simple_hash(text);
        let mut embedding = vec![0.0f32; self.dimensions];
        for value in &mut embedding {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            *value = ((state >> 16) as f32 / 32768.0) - 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(any(test, feature = "testing"))]
fn simple_hash(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI embedder.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Embedding model.
    pub model: String,
    /// Output dimensionality of the model.
    pub dimensions: usize,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiEmbedderConfig {
    /// Create a config with the given API key and text-embedding-3-small.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the embedding model and its dimensionality.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

/// Embedder backed by the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
}

impl OpenAiEmbedder {
    /// Create a new embedder with the given configuration.
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create an embedder from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            LlmError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(OpenAiEmbedderConfig::new(api_key))
    }

    async fn request_embeddings(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!(
            "{}/embeddings",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .json(&json!({
                "model": self.config.model,
                "input": inputs,
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(crate::wire::wire_error("openai", status.as_u16(), &body));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)?;
        let data = parsed
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| LlmError::MalformedResponse("no embedding data".to_string()))?;

        data.iter()
            .map(|entry| {
                entry
                    .get("embedding")
                    .and_then(|e| e.as_array())
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_f64())
                            .map(|v| v as f32)
                            .collect()
                    })
                    .ok_or_else(|| {
                        LlmError::MalformedResponse("malformed embedding entry".to_string())
                    })
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.request_embeddings(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| LlmError::MalformedResponse("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts).await
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
