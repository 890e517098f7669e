use crate::models::{EmbeddingRecord, RetrievedChunk};
use crate::{IndexInfo, SearchError};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replaces the whole index with `records`. All vectors must share one
    /// dimensionality.
    async fn replace(
        &self,
        embedder: &str,
        records: Vec<EmbeddingRecord>,
    ) -> Result<IndexInfo, SearchError>;

    async fn clear(&self) -> Result<(), SearchError>;

    async fn nearest(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError>;

    /// `None` when the index has not been built.
    async fn describe(&self) -> Option<IndexInfo>;
}
