//! Embedding generation for the semantic index.
//!
//! [`Embedder`] is the contract the memory store depends on. The default
//! implementation, [`EmbeddingService`], runs fastembed's all-MiniLM-L6-v2
//! (384 dimensions) locally.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, instrument};

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    ModelInit(String),

    #[error("Failed to generate embeddings: {0}")]
    Generation(String),

    #[error("Embedding call timed out after {0}ms")]
    Timeout(u64),

    #[error("Blocking task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts. The default implementation embeds one at a time.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Local embedding service backed by fastembed.
///
/// The model is initialized on first use and shared across all embedding calls.
pub struct EmbeddingService {
    model_name: EmbeddingModel,
    dimension: usize,
    /// Lazily initialized text embedding model
    model: OnceCell<Arc<TextEmbedding>>,
}

impl EmbeddingService {
    /// Creates a new embedding service with the specified model.
    ///
    /// The model is not loaded until the first embedding call.
    pub fn new(model_name: EmbeddingModel) -> Self {
        let dimension = match model_name {
            EmbeddingModel::AllMiniLML6V2
            | EmbeddingModel::AllMiniLML6V2Q
            | EmbeddingModel::AllMiniLML12V2
            | EmbeddingModel::AllMiniLML12V2Q
            | EmbeddingModel::BGESmallENV15
            | EmbeddingModel::BGESmallENV15Q
            | EmbeddingModel::MultilingualE5Small => 384,
            EmbeddingModel::BGEBaseENV15
            | EmbeddingModel::BGEBaseENV15Q
            | EmbeddingModel::NomicEmbedTextV1
            | EmbeddingModel::NomicEmbedTextV15
            | EmbeddingModel::NomicEmbedTextV15Q
            | EmbeddingModel::MultilingualE5Base => 768,
            EmbeddingModel::BGELargeENV15
            | EmbeddingModel::BGELargeENV15Q
            | EmbeddingModel::MultilingualE5Large => 1024,
            _ => 384,
        };

        Self {
            model_name,
            dimension,
            model: OnceCell::new(),
        }
    }

    /// Creates an embedding service from a model name string.
    pub fn from_model_str(model_name: &str) -> Result<Self, EmbeddingError> {
        let model = match model_name {
            "all-MiniLM-L6-v2" | "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
            "all-MiniLM-L12-v2" | "AllMiniLML12V2" => EmbeddingModel::AllMiniLML12V2,
            "bge-small-en-v1.5" | "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" | "BGEBaseENV15" => EmbeddingModel::BGEBaseENV15,
            "bge-large-en-v1.5" | "BGELargeENV15" => EmbeddingModel::BGELargeENV15,
            "nomic-embed-text-v1.5" | "NomicEmbedTextV15" => EmbeddingModel::NomicEmbedTextV15,
            "multilingual-e5-small" | "MultilingualE5Small" => EmbeddingModel::MultilingualE5Small,
            "multilingual-e5-base" | "MultilingualE5Base" => EmbeddingModel::MultilingualE5Base,
            "multilingual-e5-large" | "MultilingualE5Large" => EmbeddingModel::MultilingualE5Large,
            _ => {
                return Err(EmbeddingError::ModelInit(format!(
                    "Unknown embedding model: '{}'. Supported models: all-MiniLM-L6-v2, bge-base-en-v1.5, nomic-embed-text-v1.5, etc.",
                    model_name
                )));
            }
        };
        Ok(Self::new(model))
    }

    /// Creates an embedding service from config, validating dimension matches.
    pub fn from_config(model_name: &str, expected_dim: usize) -> Result<Self, EmbeddingError> {
        let service = Self::from_model_str(model_name)?;
        if service.dimension != expected_dim {
            return Err(EmbeddingError::ModelInit(format!(
                "Dimension mismatch: model '{}' produces {}-dim vectors but config specifies {}",
                model_name, service.dimension, expected_dim
            )));
        }
        Ok(service)
    }

    #[instrument(skip(self))]
    fn get_or_init_model(&self) -> Result<Arc<TextEmbedding>, EmbeddingError> {
        self.model
            .get_or_try_init(|| {
                info!(model = ?self.model_name, "Initializing embedding model");

                let mut options = InitOptions::new(self.model_name.clone());
                options.show_download_progress = true;
                let model = TextEmbedding::try_new(options)
                    .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

                info!(
                    model = ?self.model_name,
                    dimension = self.dimension,
                    "Embedding model initialized"
                );

                Ok(Arc::new(model))
            })
            .cloned()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Loads the model ahead of the first request.
    #[instrument(skip(self))]
    pub async fn warmup(&self) -> Result<(), EmbeddingError> {
        if self.model.get().is_some() {
            debug!("Model already initialized, skipping warmup");
            return Ok(());
        }
        self.get_or_init_model()?;
        Ok(())
    }
}

impl Default for EmbeddingService {
    fn default() -> Self {
        Self::new(EmbeddingModel::AllMiniLML6V2)
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("Empty embedding result".into()))
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len()))]
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.get_or_init_model()?;
        let texts: Vec<String> = texts.iter().map(|s| s.to_string()).collect();

        // fastembed is synchronous
        let embeddings = task::spawn_blocking(move || {
            model
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await??;

        debug!(
            batch_size = embeddings.len(),
            dimension = embeddings.first().map(|e| e.len()).unwrap_or(0),
            "Generated embeddings"
        );

        Ok(embeddings)
    }
}
