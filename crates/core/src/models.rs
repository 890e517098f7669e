use serde::{Deserialize, Serialize};

/// Raw text of one ingested PDF page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub source: String,
    pub source_path: String,
    pub page_number: u32,
    pub checksum: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source: String,
    pub source_path: String,
    pub page_number: u32,
    pub chunk_index: u64,
    pub text: String,
}

/// Persisted unit of the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub recursive: bool,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 500,
            chunk_overlap_chars: 50,
            recursive: false,
        }
    }
}
