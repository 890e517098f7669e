use crate::models::{EmbeddingRecord, RetrievedChunk};
use crate::similarity::rank_nearest;
use crate::traits::VectorIndex;
use crate::SearchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const INDEX_FILE_NAME: &str = "index.json";
const STAGING_FILE_NAME: &str = "index.json.tmp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub embedder: String,
    pub dimensions: usize,
    pub record_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexManifest {
    build_id: Uuid,
    built_at: DateTime<Utc>,
    embedder: String,
    dimensions: usize,
    records: Vec<EmbeddingRecord>,
}

impl IndexManifest {
    fn info(&self) -> IndexInfo {
        IndexInfo {
            build_id: self.build_id,
            built_at: self.built_at,
            embedder: self.embedder.clone(),
            dimensions: self.dimensions,
            record_count: self.records.len(),
        }
    }

    fn check_dimensions(&self) -> Result<(), SearchError> {
        match self
            .records
            .iter()
            .find(|record| record.vector.len() != self.dimensions)
        {
            Some(record) => Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: record.vector.len(),
            }),
            None => Ok(()),
        }
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, SearchError> {
        let manifest: Self = serde_json::from_slice(bytes)?;
        manifest.check_dimensions()?;
        Ok(manifest)
    }
}

/// Vector index persisted as a single JSON manifest inside a folder and
/// searched by exact cosine similarity.
pub struct FileVectorStore {
    directory: PathBuf,
    state: RwLock<Option<IndexManifest>>,
}

impl FileVectorStore {
    /// Opens the index folder, loading a previously persisted index if one
    /// exists. A manifest that cannot be decoded is treated as no index, so a
    /// rebuild can still replace it.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let directory = directory.into();
        let manifest_path = directory.join(INDEX_FILE_NAME);

        let state = match fs::read(&manifest_path).await {
            Ok(bytes) => match IndexManifest::from_slice(&bytes) {
                Ok(manifest) => {
                    info!(
                        path = %manifest_path.display(),
                        records = manifest.records.len(),
                        embedder = %manifest.embedder,
                        "loaded vector index"
                    );
                    Some(manifest)
                }
                Err(error) => {
                    warn!(
                        path = %manifest_path.display(),
                        %error,
                        "ignoring unreadable vector index until the next rebuild"
                    );
                    None
                }
            },
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %manifest_path.display(), "no persisted vector index");
                None
            }
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            directory,
            state: RwLock::new(state),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn persist(&self, manifest: &IndexManifest) -> Result<(), SearchError> {
        fs::create_dir_all(&self.directory).await?;
        let target = self.directory.join(INDEX_FILE_NAME);
        let staging = self.directory.join(STAGING_FILE_NAME);

        let bytes = serde_json::to_vec(manifest)?;
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, &target).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FileVectorStore {
    async fn replace(
        &self,
        embedder: &str,
        records: Vec<EmbeddingRecord>,
    ) -> Result<IndexInfo, SearchError> {
        let dimensions = match records.first() {
            Some(record) if !record.vector.is_empty() => record.vector.len(),
            Some(_) => {
                return Err(SearchError::DimensionMismatch {
                    expected: 1,
                    actual: 0,
                })
            }
            None => return Err(SearchError::EmptyIndex),
        };

        let manifest = IndexManifest {
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
            embedder: embedder.to_string(),
            dimensions,
            records,
        };
        manifest.check_dimensions()?;

        let mut state = self.state.write().await;
        self.persist(&manifest).await?;
        let info = manifest.info();
        *state = Some(manifest);

        info!(
            build_id = %info.build_id,
            records = info.record_count,
            dimensions = info.dimensions,
            "vector index replaced"
        );
        Ok(info)
    }

    async fn clear(&self) -> Result<(), SearchError> {
        let mut state = self.state.write().await;
        *state = None;

        for name in [INDEX_FILE_NAME, STAGING_FILE_NAME] {
            match fs::remove_file(self.directory.join(name)).await {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }

        // Only an empty folder is removed; anything else in it is not ours.
        match fs::remove_dir(&self.directory).await {
            Ok(()) => info!(path = %self.directory.display(), "deleted vector index"),
            Err(error) => debug!(
                path = %self.directory.display(),
                %error,
                "index files deleted, folder kept"
            ),
        }
        Ok(())
    }

    async fn nearest(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let state = self.state.read().await;
        let manifest = state.as_ref().ok_or(SearchError::NotInitialized)?;

        if query_vector.len() != manifest.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: manifest.dimensions,
                actual: query_vector.len(),
            });
        }

        Ok(rank_nearest(&manifest.records, query_vector, k))
    }

    async fn describe(&self) -> Option<IndexInfo> {
        self.state.read().await.as_ref().map(IndexManifest::info)
    }
}
