use crate::error::EmbeddingError;
use async_trait::async_trait;

/// Turns query text into vectors. Implemented by the caller's embedding
/// service.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Embedding of the query itself.
    async fn embedding_for(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embeddings of query reformulations, used by multi-query retrieval.
    /// The default yields the plain query embedding only.
    async fn expand(&self, text: &str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(vec![self.embedding_for(text).await?])
    }
}
