use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CatalogResult;
use crate::ids::{CrawlerId, FileId, RunId};
use crate::model::{AuditEntry, CrawlReport, CrawlerRun, FileUpsert, NewAuditEntry, StoredFileRecord};

/// File, audit, and run records.
///
/// Implementations must keep at most one non-archived record per
/// `(crawler_id, origin_uri)` and serialise concurrent upserts on that key.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Record for an identity, archived or not.
    async fn find_file(
        &self,
        crawler_id: CrawlerId,
        origin_uri: &str,
    ) -> CatalogResult<Option<StoredFileRecord>>;

    /// Create or update by `(crawler_id, origin_uri)`. Clears `archived_at`.
    async fn upsert_file(&self, upsert: FileUpsert) -> CatalogResult<StoredFileRecord>;

    /// Unchanged content: refresh the modification date, clear any processing
    /// error and restore if archived.
    async fn touch_file(
        &self,
        file_id: FileId,
        origin_modification_date: Option<DateTime<Utc>>,
    ) -> CatalogResult<()>;

    /// Soft delete. Archiving an archived record is a no-op.
    async fn archive_file(&self, file_id: FileId) -> CatalogResult<()>;

    async fn list_active_files(&self, crawler_id: CrawlerId) -> CatalogResult<Vec<StoredFileRecord>>;

    async fn append_audit_entry(&self, entry: NewAuditEntry) -> CatalogResult<AuditEntry>;

    /// Fails with `CatalogError::RunInProgress` if the crawler has an unfinished run.
    async fn start_run(&self, crawler_id: CrawlerId) -> CatalogResult<CrawlerRun>;

    /// Record the outcome of a run. A run that already ended (stopped by the
    /// user) keeps its end state and only takes the page count.
    async fn finish_run(&self, run_id: RunId, report: &CrawlReport) -> CatalogResult<CrawlerRun>;

    /// False once the run has ended.
    async fn run_is_active(&self, run_id: RunId) -> CatalogResult<bool>;

    /// Mark the crawler's unfinished run as ended by the user.
    async fn stop_run(&self, crawler_id: CrawlerId) -> CatalogResult<Option<CrawlerRun>>;
}
