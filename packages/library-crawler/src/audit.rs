//! Append-only audit trail of per-file crawl decisions.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::CatalogResult;
use crate::filter::FilterDecision;
use crate::ids::{CrawlerId, FileId, LibraryId, RunId};
use crate::model::{AuditEntry, AuditKind, DiscoveredFile, NewAuditEntry};
use crate::traits::Catalog;

/// Filter type recorded for records archived because the source no longer lists them.
pub const MISSING_FILTER_TYPE: &str = "missing";

/// Writes audit entries through the catalog.
#[derive(Clone)]
pub struct AuditTrail {
    catalog: Arc<dyn Catalog>,
}

impl AuditTrail {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    pub async fn record(&self, entry: NewAuditEntry) -> CatalogResult<AuditEntry> {
        debug!(kind = entry.kind.as_str(), message = %entry.message, "Audit entry");
        self.catalog.append_audit_entry(entry).await
    }

    /// Like [`record`](Self::record) but only logs a failure. For entries
    /// written while already handling another error.
    pub async fn record_best_effort(&self, entry: NewAuditEntry) {
        if let Err(e) = self.record(entry).await {
            warn!(error = %e, "Failed to write audit entry");
        }
    }

    /// Record a filtered-out file.
    ///
    /// A non-archived record with the same identity is archived before the
    /// entry is appended, and the entry references it. Returns the archived
    /// record's id.
    pub async fn record_omitted(
        &self,
        run_id: Option<RunId>,
        crawler_id: CrawlerId,
        library_id: LibraryId,
        file: &DiscoveredFile,
        decision: &FilterDecision,
    ) -> CatalogResult<Option<FileId>> {
        let archived = match self.catalog.find_file(crawler_id, &file.origin_uri).await? {
            Some(existing) if !existing.is_archived() => {
                self.catalog.archive_file(existing.id).await?;
                Some(existing.id)
            }
            _ => None,
        };

        let reason = decision
            .reason
            .clone()
            .unwrap_or_else(|| "File filtered".to_string());
        let filter_type = decision
            .filter_type
            .map(|t| t.as_str())
            .unwrap_or("unknown");

        let mut entry = NewAuditEntry::new(library_id, AuditKind::Omitted, reason)
            .for_run(run_id)
            .for_file(archived)
            .at(file);
        entry.filter_type = Some(filter_type.to_string());
        entry.filter_value = decision.filter_value.clone();

        self.record(entry).await?;
        Ok(archived)
    }

    /// Archive a record the source no longer lists.
    pub async fn record_missing(
        &self,
        run_id: Option<RunId>,
        library_id: LibraryId,
        file_id: FileId,
        origin_uri: &str,
        name: &str,
    ) -> CatalogResult<()> {
        self.catalog.archive_file(file_id).await?;

        let mut entry = NewAuditEntry::new(
            library_id,
            AuditKind::Omitted,
            format!("File \"{}\" is no longer present at the source", name),
        )
        .for_run(run_id)
        .for_file(Some(file_id))
        .with_filter(MISSING_FILTER_TYPE, origin_uri);
        entry.file_path = Some(origin_uri.to_string());
        entry.file_name = Some(name.to_string());

        self.record(entry).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FileFilterConfig, FileFilter};
    use crate::model::FileUpsert;
    use crate::stores::MemoryCatalog;

    fn upsert(crawler: CrawlerId, library: LibraryId, uri: &str) -> FileUpsert {
        FileUpsert {
            library_id: library,
            crawler_id: crawler,
            origin_uri: uri.to_string(),
            name: "draft.tmp".into(),
            mime_type: "application/octet-stream".into(),
            size: Some(10),
            origin_modification_date: None,
            origin_file_hash: Some("abc".into()),
            processing_error_message: None,
        }
    }

    #[tokio::test]
    async fn test_omitted_archives_existing_record_first() {
        let catalog = MemoryCatalog::new();
        let trail = AuditTrail::new(Arc::new(catalog.clone()));
        let crawler = CrawlerId::new();
        let library = LibraryId::new();
        let record = catalog
            .upsert_file(upsert(crawler, library, "smb://nas/share/draft.tmp"))
            .await
            .unwrap();

        let file = DiscoveredFile::new("1", "draft.tmp", "smb://nas/share/draft.tmp").with_size(10);
        let decision = FileFilter::new(FileFilterConfig::default().with_exclude(r"\.tmp$"))
            .evaluate(&file);
        assert!(!decision.allowed);

        let archived = trail
            .record_omitted(None, crawler, library, &file, &decision)
            .await
            .unwrap();
        assert_eq!(archived, Some(record.id));

        let stored = catalog
            .find_file(crawler, "smb://nas/share/draft.tmp")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_archived());

        let entries = catalog.audit_entries().await;
        assert_eq!(entries.len(), 1);
        let entry = &entries[0].entry;
        assert_eq!(entry.kind, AuditKind::Omitted);
        assert_eq!(entry.file_id, Some(record.id));
        assert_eq!(entry.filter_type.as_deref(), Some("excludePattern"));
        assert_eq!(entry.filter_value.as_deref(), Some(r"\.tmp$"));
        assert_eq!(entry.file_size, Some(10));
    }

    #[tokio::test]
    async fn test_omitted_without_record_has_no_file_reference() {
        let catalog = MemoryCatalog::new();
        let trail = AuditTrail::new(Arc::new(catalog.clone()));
        let file = DiscoveredFile::new("1", "a.bin", "u/a.bin");
        let decision = FileFilter::new(
            FileFilterConfig::default().with_allowed_mime_type("application/pdf"),
        )
        .evaluate(&file);

        let archived = trail
            .record_omitted(None, CrawlerId::new(), LibraryId::new(), &file, &decision)
            .await
            .unwrap();
        assert!(archived.is_none());

        let entries = catalog.audit_entries().await;
        assert_eq!(entries[0].entry.file_id, None);
        assert_eq!(entries[0].entry.filter_type.as_deref(), Some("mimeType"));
    }

    #[tokio::test]
    async fn test_missing_archives_and_logs() {
        let catalog = MemoryCatalog::new();
        let trail = AuditTrail::new(Arc::new(catalog.clone()));
        let crawler = CrawlerId::new();
        let library = LibraryId::new();
        let record = catalog.upsert_file(upsert(crawler, library, "u/gone")).await.unwrap();

        trail
            .record_missing(None, library, record.id, "u/gone", "draft.tmp")
            .await
            .unwrap();

        assert!(catalog.list_active_files(crawler).await.unwrap().is_empty());
        let entries = catalog.audit_entries().await;
        assert_eq!(entries[0].entry.filter_type.as_deref(), Some(MISSING_FILTER_TYPE));
    }
}
