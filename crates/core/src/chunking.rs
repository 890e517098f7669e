use crate::error::IngestError;
use crate::models::{Chunk, Document, IngestionOptions};
use regex::Regex;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&IngestionOptions::default())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rejoins words that the PDF layout hyphenated across a line break, then
/// collapses whitespace.
pub fn clean_page_text(text: &str) -> Result<String, IngestError> {
    let hyphenated = Regex::new(r"(\p{L})-[ \t]*\r?\n\s*(\p{L})")?;
    let joined = hyphenated.replace_all(text, "$1$2");
    Ok(normalize_whitespace(&joined))
}

/// Splits `text` into windows of at most `max_chars` characters where each
/// window starts `max_chars - overlap_chars` characters after the previous
/// one, so neighbours share exactly `overlap_chars` characters.
pub fn split_with_overlap(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start += config.step();
    }

    Ok(pieces)
}

/// Chunks one page. `global_index` is the running ordinal across the corpus;
/// the returned cursor is where the next page continues.
pub fn build_chunks(
    document: &Document,
    config: ChunkingConfig,
    global_index: u64,
) -> Result<(Vec<Chunk>, u64), IngestError> {
    let mut chunks = Vec::new();
    let mut cursor = global_index;

    for text in split_with_overlap(&document.text, config)? {
        if text.trim().is_empty() {
            continue;
        }

        chunks.push(Chunk {
            chunk_id: make_chunk_id(&document.document_id, document.page_number, cursor, &text),
            document_id: document.document_id.clone(),
            source: document.source.clone(),
            source_path: document.source_path.clone(),
            page_number: document.page_number,
            chunk_index: cursor,
            text,
        });

        cursor = cursor.saturating_add(1);
    }

    Ok((chunks, cursor))
}

/// Chunks every page in order, keeping page provenance on each chunk.
pub fn chunk_documents(
    documents: &[Document],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;
    for document in documents {
        let (page_chunks, next_cursor) = build_chunks(document, config, cursor)?;
        cursor = next_cursor;
        chunks.extend(page_chunks);
    }
    Ok(chunks)
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
