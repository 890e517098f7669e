use crate::chunking::{chunk_documents, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::ingest::{load_documents, SkippedPdf};
use crate::llm::CompletionModel;
use crate::models::{Answer, EmbeddingRecord, IngestionOptions, RetrievedChunk};
use crate::prompt::PromptTemplate;
use crate::traits::VectorIndex;
use crate::{EmbedError, IndexInfo, RagError, SearchError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub skipped_files: Vec<SkippedPdf>,
    pub index: IndexInfo,
}

/// Retrieve-then-generate over a vector index.
///
/// The embedder and completion model are shared clients created once by the
/// caller. Rebuilds take the write side of an internal gate for their whole
/// duration, so queries either see the previous index or wait for the new
/// one; they never observe a half-built index.
pub struct RagPipeline<V>
where
    V: VectorIndex,
{
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionModel>,
    extractor: Arc<dyn PdfExtractor>,
    index: V,
    template: PromptTemplate,
    options: IngestionOptions,
    top_k: usize,
    gate: RwLock<()>,
}

impl<V> RagPipeline<V>
where
    V: VectorIndex,
{
    pub fn new(embedder: Arc<dyn Embedder>, completion: Arc<dyn CompletionModel>, index: V) -> Self {
        Self {
            embedder,
            completion,
            extractor: Arc::new(LopdfExtractor),
            index,
            template: PromptTemplate::default(),
            options: IngestionOptions::default(),
            top_k: DEFAULT_TOP_K,
            gate: RwLock::new(()),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_options(mut self, options: IngestionOptions) -> Self {
        self.options = options;
        self
    }

    /// Chunks retrieved per answer; values below 1 are raised to 1.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    /// Deletes the current index, then loads, chunks and embeds every PDF in
    /// `folder`. On failure the index stays deleted.
    pub async fn rebuild(&self, folder: &Path) -> Result<RebuildReport, RagError> {
        let _guard = self.gate.write().await;

        self.index.clear().await?;
        let config = ChunkingConfig::from(&self.options);
        config.validate()?;

        let load_folder: PathBuf = folder.to_path_buf();
        let options = self.options.clone();
        let extractor = Arc::clone(&self.extractor);
        let report = tokio::task::spawn_blocking(move || {
            load_documents(&load_folder, &options, extractor.as_ref())
        })
        .await
        .map_err(join_error)??;

        let chunks = chunk_documents(&report.documents, config)?;
        info!(
            folder = %folder.display(),
            pages = report.documents.len(),
            chunk_count = chunks.len(),
            "embedding chunks"
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(join_error)??;

        if vectors.len() != chunks.len() {
            return Err(EmbedError::BackendResponse {
                backend: self.embedder.name(),
                details: format!(
                    "embedding count {} doesn't match chunk count {}",
                    vectors.len(),
                    chunks.len()
                ),
            }
            .into());
        }

        let chunk_count = chunks.len();
        let records = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord { vector, chunk })
            .collect();
        let index = self.index.replace(&self.embedder.name(), records).await?;

        Ok(RebuildReport {
            documents: report.documents.len(),
            chunks: chunk_count,
            skipped_files: report.skipped_files,
            index,
        })
    }

    /// The `k` chunks nearest to `query`, nearest first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery.into());
        }

        let _guard = self.gate.read().await;
        let built = self
            .index
            .describe()
            .await
            .ok_or(SearchError::NotInitialized)?;

        let active = self.embedder.name();
        if built.embedder != active {
            return Err(SearchError::EmbedderMismatch {
                indexed: built.embedder,
                active,
            }
            .into());
        }

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(join_error)??;

        Ok(self.index.nearest(&vector, k).await?)
    }

    /// Retrieves `top_k` chunks for `question` and asks the completion model
    /// to answer from them. The generated text is returned unmodified.
    pub async fn answer(&self, question: &str) -> Result<Answer, RagError> {
        let sources = self.search(question, self.top_k).await?;
        let prompt = self.template.render(question, &sources);
        info!(
            sources = sources.len(),
            prompt_chars = prompt.chars().count(),
            "generating answer"
        );

        let text = self.completion.complete(&prompt).await?;
        Ok(Answer { text, sources })
    }
}

fn join_error(error: tokio::task::JoinError) -> RagError {
    RagError::Task(error.to_string())
}
