use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StorageError;
use crate::ids::{FileId, LibraryId};
use crate::traits::ByteStorage;

const UPLOAD_FILE_NAME: &str = "upload";

/// Stores bytes at `<root>/<library_id>/<file_id>/upload`.
#[derive(Debug, Clone)]
pub struct FsByteStorage {
    root: PathBuf,
}

impl FsByteStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, library_id: LibraryId, file_id: FileId) -> PathBuf {
        self.root
            .join(library_id.to_string())
            .join(file_id.to_string())
            .join(UPLOAD_FILE_NAME)
    }
}

#[async_trait]
impl ByteStorage for FsByteStorage {
    async fn write_file_bytes(
        &self,
        library_id: LibraryId,
        file_id: FileId,
        source: &Path,
    ) -> Result<PathBuf, StorageError> {
        let target = self.path_for(library_id, file_id);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Copy beside the target first so readers never see a partial file
        let partial = target.with_extension("partial");
        tokio::fs::copy(source, &partial).await?;
        tokio::fs::rename(&partial, &target).await?;

        debug!(file_id = %file_id, path = %target.display(), "Stored file bytes");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsByteStorage::new(dir.path().join("uploads"));
        let library = LibraryId::new();
        let file = FileId::new();

        let source = dir.path().join("staged");
        std::fs::write(&source, b"v1").unwrap();
        let path = storage.write_file_bytes(library, file, &source).await.unwrap();
        assert_eq!(path, storage.path_for(library, file));
        assert_eq!(std::fs::read(&path).unwrap(), b"v1");

        std::fs::write(&source, b"v2").unwrap();
        storage.write_file_bytes(library, file, &source).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"v2");
        assert!(!path.with_extension("partial").exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsByteStorage::new(dir.path());
        let result = storage
            .write_file_bytes(LibraryId::new(), FileId::new(), &dir.path().join("nope"))
            .await;
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
