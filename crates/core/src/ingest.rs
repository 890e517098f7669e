use crate::chunking::clean_page_text;
use crate::extractor::PdfExtractor;
use crate::{Document, IngestError, IngestionOptions};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = if recursive {
        WalkDir::new(folder)
    } else {
        WalkDir::new(folder).max_depth(1)
    };

    for entry in walker.into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Loads every readable page of every PDF in `folder`. Unreadable files are
/// reported in `skipped_files`; the load only fails when nothing is left.
pub fn load_documents(
    folder: &Path,
    options: &IngestionOptions,
    extractor: &dyn PdfExtractor,
) -> Result<LoadReport, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::MissingFolder(folder.display().to_string()));
    }

    let files = discover_pdf_files(folder, options.recursive);
    if files.is_empty() {
        return Err(IngestError::EmptyCorpus(folder.display().to_string()));
    }
    info!(folder = %folder.display(), file_count = files.len(), "loading pdf documents");

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_file(&path, extractor) {
            Ok(pages) => {
                debug!(path = %path.display(), pages = pages.len(), "loaded pdf");
                documents.extend(pages);
            }
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped pdf");
                skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    if documents.is_empty() {
        return Err(IngestError::EmptyCorpus(folder.display().to_string()));
    }

    Ok(LoadReport {
        documents,
        skipped_files,
    })
}

fn load_file(path: &Path, extractor: &dyn PdfExtractor) -> Result<Vec<Document>, IngestError> {
    let checksum = digest_file(path)?;
    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();
    let source_path = path.to_string_lossy().to_string();
    let document_id = generate_document_id(path);

    let mut documents = Vec::new();
    for page in extractor.extract_pages(path)? {
        let text = clean_page_text(&page.text)?;
        if text.is_empty() {
            continue;
        }
        documents.push(Document {
            document_id: document_id.clone(),
            source: source.clone(),
            source_path: source_path.clone(),
            page_number: page.number,
            checksum: checksum.clone(),
            text,
        });
    }

    Ok(documents)
}

fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}
