use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("input folder not found: {0}")]
    MissingFolder(String),

    #[error("no readable pdf pages found in {0}")]
    EmptyCorpus(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid embedder config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("vector index is not initialized; run a rebuild first")]
    NotInitialized,

    #[error("refusing to persist an empty vector index")]
    EmptyIndex,

    #[error("query is empty")]
    EmptyQuery,

    #[error("index was built with embedder {indexed} but queries use {active}")]
    EmbedderMismatch { indexed: String, active: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend} ({status}): {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("completion response contained no choices")]
    EmptyCompletion,

    #[error("invalid completion config: {0}")]
    InvalidConfig(String),
}

/// Every failure the retrieve-then-generate pipeline can surface.
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("background task failed: {0}")]
    Task(String),
}
