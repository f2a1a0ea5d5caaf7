//! Local embedding provider backed by fastembed ONNX models.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use super::{EmbeddingProvider, ProviderError};
use crate::vector::VectorDimension;

/// On-device provider using fastembed's AllMiniLM family.
///
/// The model runs locally, so every failure after initialization is
/// permanent; only the first-run model download is worth retrying.
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
    model_id: String,
}

impl FastEmbedProvider {
    /// Initialize the model, downloading it into `cache_dir` on first use.
    pub fn new(model_id: &str, cache_dir: &Path) -> Result<Self, ProviderError> {
        let (model, dimension) = resolve_model(model_id)?;

        info!(
            "loading embedding model {model_id} ({} dimensions)",
            dimension.get()
        );
        let text_embedding = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| ProviderError::Transient {
            reason: format!(
                "failed to initialize embedding model: {e}. First-time use downloads the model and needs network access"
            ),
        })?;

        Ok(Self {
            model: Mutex::new(text_embedding),
            dimension,
            model_id: model_id.to_string(),
        })
    }

    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        let embeddings = self
            .model
            .lock()
            .map_err(|_| ProviderError::Fatal {
                reason: "embedding model lock poisoned".to_string(),
            })?
            .embed(texts, None)
            .map_err(|e| ProviderError::Fatal {
                reason: format!("embedding inference failed: {e}"),
            })?;

        let expected = self.dimension.get();
        for embedding in &embeddings {
            if embedding.len() != expected {
                return Err(ProviderError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        Ok(embeddings)
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        // fastembed's embed takes owned strings
        self.embed_batch(texts.iter().map(|&s| s.to_string()).collect())
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut embeddings = self.embed_batch(vec![text.to_string()])?;
        embeddings.pop().ok_or_else(|| ProviderError::Fatal {
            reason: "provider returned no embedding for query".to_string(),
        })
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Map a configured model id to a fastembed model and its dimension.
fn resolve_model(model_id: &str) -> Result<(EmbeddingModel, VectorDimension), ProviderError> {
    // All supported models emit 384-dimensional embeddings
    let dim = VectorDimension::dimension_384();
    match model_id {
        "all-minilm-l6-v2" | "AllMiniLML6V2" => Ok((EmbeddingModel::AllMiniLML6V2, dim)),
        "all-minilm-l12-v2" | "AllMiniLML12V2" => Ok((EmbeddingModel::AllMiniLML12V2, dim)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, dim)),
        other => Err(ProviderError::Fatal {
            reason: format!(
                "unknown embedding model '{other}'; supported: all-minilm-l6-v2, all-minilm-l12-v2, bge-small-en-v1.5"
            ),
        }),
    }
}
