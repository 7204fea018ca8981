//! In-memory collaborators for tests and development.
//!
//! Not suitable for production as data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{CatalogError, CatalogResult, StorageError};
use crate::ids::{AuditEntryId, CrawlerId, FileId, LibraryId, RunId};
use crate::model::{
    AuditEntry, CrawlReport, CrawlerRun, FileUpsert, NewAuditEntry, StoredFileRecord,
};
use crate::traits::{ByteStorage, Catalog};

#[derive(Default)]
struct CatalogState {
    files: HashMap<FileId, StoredFileRecord>,
    by_identity: HashMap<(CrawlerId, String), FileId>,
    audit: Vec<AuditEntry>,
    runs: HashMap<RunId, CrawlerRun>,
}

/// Catalog held in process memory. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
    upserts: Arc<AtomicUsize>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing upsert bookkeeping.
    pub async fn insert_file(&self, record: StoredFileRecord) {
        let mut state = self.state.write().await;
        state
            .by_identity
            .insert((record.crawler_id, record.origin_uri.clone()), record.id);
        state.files.insert(record.id, record);
    }

    pub async fn files(&self) -> Vec<StoredFileRecord> {
        let mut files: Vec<_> = self.state.read().await.files.values().cloned().collect();
        files.sort_by(|a, b| a.id.cmp(&b.id));
        files
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.read().await.audit.clone()
    }

    pub async fn runs(&self) -> Vec<CrawlerRun> {
        let mut runs: Vec<_> = self.state.read().await.runs.values().cloned().collect();
        runs.sort_by(|a, b| a.id.cmp(&b.id));
        runs
    }

    /// Number of `upsert_file` calls so far.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn find_file(
        &self,
        crawler_id: CrawlerId,
        origin_uri: &str,
    ) -> CatalogResult<Option<StoredFileRecord>> {
        let state = self.state.read().await;
        Ok(state
            .by_identity
            .get(&(crawler_id, origin_uri.to_string()))
            .and_then(|id| state.files.get(id))
            .cloned())
    }

    async fn upsert_file(&self, upsert: FileUpsert) -> CatalogResult<StoredFileRecord> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let mut state = self.state.write().await;
        let key = (upsert.crawler_id, upsert.origin_uri.clone());

        let record = match state.by_identity.get(&key).copied() {
            Some(id) => {
                let record = state.files.get_mut(&id).ok_or_else(|| CatalogError::NotFound {
                    entity: "file",
                    id: id.to_string(),
                })?;
                record.library_id = upsert.library_id;
                record.name = upsert.name;
                record.mime_type = upsert.mime_type;
                record.size = upsert.size;
                record.origin_modification_date = upsert.origin_modification_date;
                if upsert.origin_file_hash.is_some() {
                    record.origin_file_hash = upsert.origin_file_hash;
                }
                record.processing_error_message = upsert.processing_error_message;
                record.archived_at = None;
                record.updated_at = now;
                record.clone()
            }
            None => {
                let record = StoredFileRecord {
                    id: FileId::new(),
                    library_id: upsert.library_id,
                    crawler_id: upsert.crawler_id,
                    origin_uri: upsert.origin_uri,
                    name: upsert.name,
                    mime_type: upsert.mime_type,
                    size: upsert.size,
                    origin_modification_date: upsert.origin_modification_date,
                    origin_file_hash: upsert.origin_file_hash,
                    archived_at: None,
                    processing_error_message: upsert.processing_error_message,
                    created_at: now,
                    updated_at: now,
                };
                state.by_identity.insert(key, record.id);
                state.files.insert(record.id, record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn touch_file(
        &self,
        file_id: FileId,
        origin_modification_date: Option<DateTime<Utc>>,
    ) -> CatalogResult<()> {
        let mut state = self.state.write().await;
        let record = state.files.get_mut(&file_id).ok_or_else(|| CatalogError::NotFound {
            entity: "file",
            id: file_id.to_string(),
        })?;
        if origin_modification_date.is_some() {
            record.origin_modification_date = origin_modification_date;
        }
        record.processing_error_message = None;
        record.archived_at = None;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn archive_file(&self, file_id: FileId) -> CatalogResult<()> {
        let mut state = self.state.write().await;
        let record = state.files.get_mut(&file_id).ok_or_else(|| CatalogError::NotFound {
            entity: "file",
            id: file_id.to_string(),
        })?;
        if record.archived_at.is_none() {
            record.archived_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_active_files(&self, crawler_id: CrawlerId) -> CatalogResult<Vec<StoredFileRecord>> {
        let state = self.state.read().await;
        let mut files: Vec<_> = state
            .files
            .values()
            .filter(|f| f.crawler_id == crawler_id && f.archived_at.is_none())
            .cloned()
            .collect();
        files.sort_by(|a, b| a.origin_uri.cmp(&b.origin_uri));
        Ok(files)
    }

    async fn append_audit_entry(&self, entry: NewAuditEntry) -> CatalogResult<AuditEntry> {
        let entry = AuditEntry {
            id: AuditEntryId::new(),
            created_at: Utc::now(),
            entry,
        };
        self.state.write().await.audit.push(entry.clone());
        Ok(entry)
    }

    async fn start_run(&self, crawler_id: CrawlerId) -> CatalogResult<CrawlerRun> {
        let mut state = self.state.write().await;
        if state
            .runs
            .values()
            .any(|r| r.crawler_id == crawler_id && r.is_running())
        {
            return Err(CatalogError::RunInProgress(crawler_id));
        }
        let run = CrawlerRun {
            id: RunId::new(),
            crawler_id,
            started_at: Utc::now(),
            ended_at: None,
            success: None,
            error_message: None,
            pages_crawled: 0,
        };
        state.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn finish_run(&self, run_id: RunId, report: &CrawlReport) -> CatalogResult<CrawlerRun> {
        let mut state = self.state.write().await;
        let run = state.runs.get_mut(&run_id).ok_or_else(|| CatalogError::NotFound {
            entity: "crawler run",
            id: run_id.to_string(),
        })?;
        if run.is_running() {
            run.ended_at = Some(Utc::now());
            run.success = Some(report.success());
            run.error_message = report.error_summary();
        }
        run.pages_crawled = report.pages_crawled;
        Ok(run.clone())
    }

    async fn run_is_active(&self, run_id: RunId) -> CatalogResult<bool> {
        let state = self.state.read().await;
        state
            .runs
            .get(&run_id)
            .map(CrawlerRun::is_running)
            .ok_or_else(|| CatalogError::NotFound {
                entity: "crawler run",
                id: run_id.to_string(),
            })
    }

    async fn stop_run(&self, crawler_id: CrawlerId) -> CatalogResult<Option<CrawlerRun>> {
        let mut state = self.state.write().await;
        let Some(run) = state
            .runs
            .values_mut()
            .find(|r| r.crawler_id == crawler_id && r.is_running())
        else {
            return Ok(None);
        };
        run.ended_at = Some(Utc::now());
        run.success = Some(false);
        run.error_message = Some("Run stopped by user".to_string());
        Ok(Some(run.clone()))
    }
}

/// Byte storage that keeps contents in memory and counts writes.
#[derive(Clone, Default)]
pub struct MemoryByteStorage {
    blobs: Arc<RwLock<HashMap<(LibraryId, FileId), Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryByteStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, library_id: LibraryId, file_id: FileId) -> Option<Vec<u8>> {
        self.blobs.read().await.get(&(library_id, file_id)).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteStorage for MemoryByteStorage {
    async fn write_file_bytes(
        &self,
        library_id: LibraryId,
        file_id: FileId,
        source: &Path,
    ) -> Result<PathBuf, StorageError> {
        let bytes = tokio::fs::read(source).await?;
        self.blobs.write().await.insert((library_id, file_id), bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(PathBuf::from(format!("memory://{}/{}", library_id, file_id)))
    }
}
