use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::ids::{FileId, LibraryId};

/// Final placement of file bytes.
#[async_trait]
pub trait ByteStorage: Send + Sync {
    /// Copy the staged file at `source` to the file's storage location and
    /// return that location. Overwrites any previous bytes.
    async fn write_file_bytes(
        &self,
        library_id: LibraryId,
        file_id: FileId,
        source: &Path,
    ) -> Result<PathBuf, StorageError>;
}
