//! OpenAI embeddings implementation.

use super::Embedder;
use crate::config::EmbeddingSettings;
use crate::error::{AdvisorError, Result};
use crate::openai::create_client;
use async_openai::types::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Largest number of inputs the embeddings endpoint accepts per request.
const MAX_BATCH_SIZE: usize = 2048;

/// OpenAI-based embedder.
pub struct OpenAIEmbedder {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    dimensions: usize,
    batch_size: usize,
    request_delay: Duration,
}

impl OpenAIEmbedder {
    /// Create an embedder for `text-embedding-3-large` at full size.
    pub fn new() -> Result<Self> {
        Self::with_config("text-embedding-3-large", 3072)
    }

    /// Create an embedder with a custom model and dimensions.
    pub fn with_config(model: &str, dimensions: usize) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            dimensions,
            batch_size: 100,
            request_delay: Duration::from_millis(100),
        })
    }

    /// Create an embedder from embedding settings.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        Ok(Self::with_config(&settings.model, settings.dimensions as usize)?
            .with_batch_size(settings.batch_size)
            .with_request_delay(Duration::from_millis(settings.request_delay_ms)))
    }

    /// Set the number of texts sent per request (clamped to 1..=2048).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Set the pause between consecutive requests.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AdvisorError::Embedding("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (batch_idx, batch) in texts.chunks(self.batch_size).enumerate() {
            if batch_idx > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(EmbeddingInput::StringArray(batch.to_vec()))
                .dimensions(self.dimensions as u32)
                .build()
                .map_err(|e| AdvisorError::Embedding(format!("Failed to build request: {}", e)))?;

            let response = self
                .client
                .embeddings()
                .create(request)
                .await
                .map_err(|e| AdvisorError::OpenAI(format!("Embedding API error: {}", e)))?;

            if response.data.len() != batch.len() {
                return Err(AdvisorError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    response.data.len()
                )));
            }

            let mut embeddings = response.data;
            embeddings.sort_by_key(|e| e.index);
            all_embeddings.extend(embeddings.into_iter().map(|e| e.embedding));

            debug!("Embedded batch {} ({} texts)", batch_idx + 1, batch.len());
        }

        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
