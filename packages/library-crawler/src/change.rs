//! Content hashing and create/update/unchanged decisions.
//!
//! Bytes are streamed into a temp file in the staging directory while being
//! hashed, so large files never sit in memory. The temp file is deleted when
//! the [`StagedContent`] is dropped, whichever path the caller takes.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use crate::error::ItemError;
use crate::model::StoredFileRecord;
use crate::strategies::ByteStream;

/// Hex SHA-256 of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDecision {
    /// No record exists for this identity.
    Create,
    /// Record exists with a different or missing hash.
    Update,
    /// Stored hash equals the fetched hash.
    Unchanged,
}

/// Compare by hash only; modification timestamps are ignored.
pub fn decide(existing: Option<&StoredFileRecord>, hash: &str) -> ChangeDecision {
    match existing {
        None => ChangeDecision::Create,
        Some(record) => match record.origin_file_hash.as_deref() {
            Some(stored) if stored.eq_ignore_ascii_case(hash) => ChangeDecision::Unchanged,
            _ => ChangeDecision::Update,
        },
    }
}

/// Fetched bytes on local disk plus their hash. Dropping removes the file.
#[derive(Debug)]
pub struct StagedContent {
    path: TempPath,
    hash: String,
    size: u64,
}

impl StagedContent {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    staging_dir: PathBuf,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl ChangeDetector {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Drain `bytes` into a temp file, hashing as it goes.
    pub async fn stage(&self, mut bytes: ByteStream) -> Result<StagedContent, ItemError> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let temp = tempfile::Builder::new()
            .prefix("crawl-")
            .tempfile_in(&self.staging_dir)?;
        let (file, path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut hasher = Sha256::new();
        let mut size = 0u64;
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            size += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(StagedContent {
            path,
            hash: hex::encode(hasher.finalize()),
            size,
        })
    }
}
