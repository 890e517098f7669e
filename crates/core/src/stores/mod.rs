pub mod file;

pub use file::{FileVectorStore, IndexInfo, INDEX_FILE_NAME};
