pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod similarity;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{
    build_chunks, chunk_documents, clean_page_text, normalize_whitespace, split_with_overlap,
    ChunkingConfig,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OpenAiEmbedder, OpenAiEmbedderConfig,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{EmbedError, GenerationError, IngestError, RagError, SearchError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{discover_pdf_files, load_documents, LoadReport, SkippedPdf};
pub use llm::{
    CompletionModel, OpenAiChatConfig, OpenAiChatModel, UnconfiguredModel, DEFAULT_TEMPERATURE,
};
pub use models::{Answer, Chunk, Document, EmbeddingRecord, IngestionOptions, RetrievedChunk};
pub use pipeline::{RagPipeline, RebuildReport, DEFAULT_TOP_K};
pub use prompt::PromptTemplate;
pub use similarity::cosine_similarity;
pub use stores::{FileVectorStore, IndexInfo};
pub use traits::VectorIndex;
