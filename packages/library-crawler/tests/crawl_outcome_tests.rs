//! Per-item decisions of the orchestrator: change detection, filtering,
//! size limits, fault isolation, missing-file sweep and run bookkeeping.

mod common;

use common::{kinds, Harness};
use futures::StreamExt;
use library_crawler::audit::MISSING_FILTER_TYPE;
use library_crawler::strategies::{CloudStorageStrategy, RemoteShareStrategy};
use library_crawler::testing::{smb_file, MockCloudStorageClient, MockRemoteShareClient};
use library_crawler::{
    AuditKind, Catalog, CrawlError, CrawlOutcome, FileFilterConfig, FilterType, SizeGuard,
    SourceKind, StrategyRegistry,
};
use std::collections::HashSet;

const SHARE: &str = "smb://nas/docs/";

fn share_client() -> MockRemoteShareClient {
    MockRemoteShareClient::new()
        .with_file(smb_file("1", "a.txt"), "alpha")
        .with_file(smb_file("2", "b.txt"), "beta")
        .with_file(smb_file("3", "c.txt"), "gamma")
}

fn share_registry(client: &MockRemoteShareClient) -> StrategyRegistry {
    StrategyRegistry::new().with(RemoteShareStrategy::new(client.clone()))
}

async fn share_harness(client: &MockRemoteShareClient) -> Harness {
    let harness = Harness::new(share_registry(client));
    harness.smb_credentials().await;
    harness
}

#[tokio::test]
async fn unchanged_source_is_skipped_on_second_crawl() {
    let client = share_client();
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);

    let first = harness.crawl(&descriptor).await.unwrap();
    assert_eq!(kinds(&first), vec!["saved", "saved", "saved"]);
    assert!(first
        .iter()
        .all(|o| matches!(o, CrawlOutcome::Saved { was_updated: false, .. })));
    let writes = harness.storage.write_count();
    assert_eq!(writes, 3);

    let second = harness.crawl(&descriptor).await.unwrap();
    assert_eq!(
        kinds(&second),
        vec!["skippedUnchanged", "skippedUnchanged", "skippedUnchanged"]
    );
    assert_eq!(harness.storage.write_count(), writes);

    let skipped = harness
        .catalog
        .audit_entries()
        .await
        .into_iter()
        .filter(|e| e.entry.kind == AuditKind::Skipped)
        .count();
    assert_eq!(skipped, 3);
}

#[tokio::test]
async fn each_origin_has_one_active_record() {
    let client = share_client();
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);

    harness.crawl(&descriptor).await.unwrap();
    let ids_before: Vec<_> = harness.active_files().await.iter().map(|f| f.id).collect();

    client.set_content("2", "beta, revised");
    harness.crawl(&descriptor).await.unwrap();
    harness.crawl(&descriptor).await.unwrap();

    let active = harness.active_files().await;
    assert_eq!(active.len(), 3);
    let origins: HashSet<_> = active.iter().map(|f| f.origin_uri.clone()).collect();
    assert_eq!(origins.len(), 3);
    let ids_after: Vec<_> = active.iter().map(|f| f.id).collect();
    assert_eq!(ids_before, ids_after);
}

#[tokio::test]
async fn legacy_record_without_hash_counts_as_update() {
    let client = MockRemoteShareClient::new().with_file(smb_file("1", "a.txt"), "alpha");
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);

    harness.crawl(&descriptor).await.unwrap();
    let mut record = harness.file_by_uri("smb://nas/docs/a.txt").await.unwrap();
    record.origin_file_hash = None;
    harness.catalog.insert_file(record).await;

    let outcomes = harness.crawl(&descriptor).await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [CrawlOutcome::Saved { was_updated: true, .. }]
    ));
}

#[tokio::test]
async fn mime_filter_omits_without_downloading() {
    let client = MockRemoteShareClient::new()
        .with_file(smb_file("1", "report.pdf"), "%PDF-1.7")
        .with_file(smb_file("2", "notes.txt"), "plain");
    let harness = share_harness(&client).await;
    let descriptor = harness
        .descriptor(SourceKind::RemoteShare, SHARE)
        .with_filter(FileFilterConfig::default().with_allowed_mime_type("application/pdf"));

    let outcomes = harness.crawl(&descriptor).await.unwrap();
    assert_eq!(kinds(&outcomes), vec!["saved", "omittedByFilter"]);
    match &outcomes[1] {
        CrawlOutcome::OmittedByFilter {
            filter_type,
            filter_value,
            archived_file_id,
            ..
        } => {
            assert_eq!(*filter_type, FilterType::MimeType);
            assert_eq!(filter_value, "application/pdf");
            assert!(archived_file_id.is_none());
        }
        other => panic!("expected omitted outcome, got {:?}", other),
    }
    assert_eq!(client.downloads(), vec!["1".to_string()]);
    assert!(harness.file_by_uri("smb://nas/docs/notes.txt").await.is_none());

    let omitted: Vec<_> = harness
        .catalog
        .audit_entries()
        .await
        .into_iter()
        .filter(|e| e.entry.kind == AuditKind::Omitted)
        .collect();
    assert_eq!(omitted.len(), 1);
    assert_eq!(omitted[0].entry.filter_type.as_deref(), Some("mimeType"));
    assert_eq!(
        omitted[0].entry.file_path.as_deref(),
        Some("smb://nas/docs/notes.txt")
    );
}

#[tokio::test]
async fn newly_filtered_file_archives_existing_record() {
    let client = MockRemoteShareClient::new()
        .with_file(smb_file("1", "keep.pdf"), "%PDF")
        .with_file(smb_file("2", "drafts/old.pdf"), "%PDF old");
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);
    harness.crawl(&descriptor).await.unwrap();

    let filtered = descriptor
        .clone()
        .with_filter(FileFilterConfig::default().with_exclude("^drafts/"));
    let outcomes = harness.crawl(&filtered).await.unwrap();
    let record = harness
        .file_by_uri("smb://nas/docs/drafts/old.pdf")
        .await
        .unwrap();

    match &outcomes[1] {
        CrawlOutcome::OmittedByFilter {
            filter_type,
            archived_file_id,
            ..
        } => {
            assert_eq!(*filter_type, FilterType::ExcludePattern);
            assert_eq!(*archived_file_id, Some(record.id));
        }
        other => panic!("expected omitted outcome, got {:?}", other),
    }
    assert!(record.is_archived());

    // Lifting the filter restores the same record.
    let outcomes = harness.crawl(&descriptor).await.unwrap();
    assert_eq!(kinds(&outcomes), vec!["skippedUnchanged", "skippedUnchanged"]);
    let restored = harness
        .file_by_uri("smb://nas/docs/drafts/old.pdf")
        .await
        .unwrap();
    assert_eq!(restored.id, record.id);
    assert!(!restored.is_archived());
}

#[tokio::test]
async fn size_thresholds_apply_before_download() {
    let client = MockRemoteShareClient::new()
        .with_file(smb_file("1", "exact.bin"), "0123456789")
        .with_file(smb_file("2", "under.bin"), "012345678")
        .with_file(smb_file("3", "small.bin"), "abc");
    let harness = Harness::with_guard(share_registry(&client), SizeGuard::new(4, 10));
    harness.smb_credentials().await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);

    let outcomes = harness.crawl(&descriptor).await.unwrap();
    assert_eq!(kinds(&outcomes), vec!["tooLarge", "saved", "saved"]);
    assert!(matches!(&outcomes[0], CrawlOutcome::TooLarge { size: 10, .. }));
    assert!(matches!(&outcomes[1], CrawlOutcome::Saved { should_warn: true, .. }));
    assert!(matches!(&outcomes[2], CrawlOutcome::Saved { should_warn: false, .. }));
    assert_eq!(client.downloads(), vec!["2".to_string(), "3".to_string()]);

    let record = harness.file_by_uri("smb://nas/docs/exact.bin").await.unwrap();
    assert!(record
        .processing_error_message
        .as_deref()
        .unwrap()
        .starts_with("File too large:"));
    assert!(record.origin_file_hash.is_none());
    assert!(harness.stored_bytes("smb://nas/docs/exact.bin").await.is_none());

    let errors: Vec<_> = harness
        .catalog
        .audit_entries()
        .await
        .into_iter()
        .filter(|e| e.entry.kind == AuditKind::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].entry.file_size, Some(10));
    assert_eq!(errors[0].entry.file_id, Some(record.id));
}

#[tokio::test]
async fn file_back_under_the_size_limit_loses_its_error() {
    let client = MockRemoteShareClient::new().with_file(smb_file("1", "report.bin"), "small");
    let harness = Harness::with_guard(share_registry(&client), SizeGuard::new(8, 10));
    harness.smb_credentials().await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);
    harness.crawl(&descriptor).await.unwrap();

    client.set_content("1", "far too large");
    let outcomes = harness.crawl(&descriptor).await.unwrap();
    assert_eq!(kinds(&outcomes), vec!["tooLarge"]);
    let rejected = harness.file_by_uri("smb://nas/docs/report.bin").await.unwrap();
    assert!(rejected.processing_error_message.is_some());

    client.set_content("1", "small");
    let outcomes = harness.crawl(&descriptor).await.unwrap();
    assert_eq!(kinds(&outcomes), vec!["skippedUnchanged"]);
    let record = harness.file_by_uri("smb://nas/docs/report.bin").await.unwrap();
    assert_eq!(record.id, rejected.id);
    assert!(record.processing_error_message.is_none());
}

#[tokio::test]
async fn failed_download_does_not_stop_the_crawl() {
    let client = share_client().failing_download("2");
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);

    let outcomes = harness.crawl(&descriptor).await.unwrap();
    assert_eq!(kinds(&outcomes), vec!["saved", "error", "saved"]);
    match &outcomes[1] {
        CrawlOutcome::Error {
            origin_uri, hints, ..
        } => {
            assert_eq!(origin_uri.as_deref(), Some("smb://nas/docs/b.txt"));
            assert!(hints.starts_with("Error processing SMB file smb://nas/docs/b.txt"));
        }
        other => panic!("expected error outcome, got {:?}", other),
    }
    assert_eq!(harness.active_files().await.len(), 2);

    let report = harness.orchestrator.run(&descriptor).await.unwrap();
    assert_eq!(report.errors, 1);
    assert_eq!(report.skipped_unchanged, 2);
    assert!(!report.success());
}

#[tokio::test]
async fn source_removals_are_archived_after_a_complete_crawl() {
    let client = MockCloudStorageClient::new().with_folder("0", &[], &["a.txt", "b.txt", "c.txt"]);
    let mut harness = Harness::new(StrategyRegistry::new().with(CloudStorageStrategy::new(client)));
    harness.box_token().await;
    let descriptor = harness.descriptor(SourceKind::CloudStorage, "box://0");
    harness.crawl(&descriptor).await.unwrap();
    assert_eq!(harness.active_files().await.len(), 3);

    let shrunk = MockCloudStorageClient::new().with_folder("0", &[], &["a.txt", "b.txt"]);
    harness.replace_registry(StrategyRegistry::new().with(CloudStorageStrategy::new(shrunk)));

    // A crawl cut short by the page limit must not archive anything.
    harness
        .crawl(&descriptor.clone().with_max_pages(1))
        .await
        .unwrap();
    assert_eq!(harness.active_files().await.len(), 3);

    harness.crawl(&descriptor).await.unwrap();
    let active: Vec<_> = harness
        .active_files()
        .await
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(active.len(), 2);
    assert!(!active.contains(&"c.txt".to_string()));

    let missing: Vec<_> = harness
        .catalog
        .audit_entries()
        .await
        .into_iter()
        .filter(|e| e.entry.filter_type.as_deref() == Some(MISSING_FILTER_TYPE))
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].entry.kind, AuditKind::Omitted);
    assert_eq!(missing[0].entry.file_name.as_deref(), Some("c.txt"));
}

#[tokio::test]
async fn run_is_recorded_in_the_catalog() {
    let client = share_client();
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);

    let report = harness.orchestrator.run(&descriptor).await.unwrap();
    assert_eq!(report.pages_crawled, 3);
    assert_eq!(report.created, 3);
    assert!(report.success());

    let runs = harness.catalog.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].success, Some(true));
    assert_eq!(runs[0].pages_crawled, 3);
    assert!(runs[0].ended_at.is_some());

    let run_ids: HashSet<_> = harness
        .catalog
        .audit_entries()
        .await
        .into_iter()
        .map(|e| e.entry.crawler_run_id)
        .collect();
    assert_eq!(run_ids, HashSet::from([Some(runs[0].id)]));
}

#[tokio::test]
async fn overlapping_runs_are_refused() {
    let client = share_client();
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);

    harness.catalog.start_run(harness.crawler_id).await.unwrap();
    let result = harness.orchestrator.run(&descriptor).await;
    assert!(matches!(result, Err(CrawlError::RunInProgress(_))));
    assert_eq!(client.start_calls(), 0);

    let stopped = harness
        .orchestrator
        .stop(harness.crawler_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stopped.error_message.as_deref(), Some("Run stopped by user"));
    assert!(harness.orchestrator.run(&descriptor).await.is_ok());
}

#[tokio::test]
async fn stopped_run_ends_the_crawl_and_cancels_the_job() {
    let client = share_client();
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);
    let catalog = harness.catalog.clone();
    let crawler_id = harness.crawler_id;

    let report = harness
        .orchestrator
        .run_with(&descriptor, |_| {
            futures::executor::block_on(catalog.stop_run(crawler_id)).unwrap();
        })
        .await
        .unwrap();
    assert_eq!(report.pages_crawled, 1);
    assert_eq!(client.downloads(), vec!["1".to_string()]);
    assert_eq!(client.cancelled_jobs(), vec!["job-1".to_string()]);

    let runs = harness.catalog.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].success, Some(false));
    assert_eq!(runs[0].error_message.as_deref(), Some("Run stopped by user"));
    assert_eq!(runs[0].pages_crawled, 1);
    // No sweep after a stopped crawl
    assert_eq!(harness.active_files().await.len(), 1);
}

#[tokio::test]
async fn crawl_stream_ends_once_its_run_is_stopped() {
    let client = share_client();
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);
    let run = harness.catalog.start_run(harness.crawler_id).await.unwrap();

    let mut outcomes = harness.orchestrator.crawl(&descriptor, Some(run.id));
    assert!(matches!(outcomes.next().await, Some(Ok(CrawlOutcome::Saved { .. }))));
    harness.orchestrator.stop(harness.crawler_id).await.unwrap();
    assert!(outcomes.next().await.is_none());
    drop(outcomes);

    assert_eq!(client.cancelled_jobs(), vec!["job-1".to_string()]);
}

#[tokio::test]
async fn fatal_failure_finishes_the_run_unsuccessfully() {
    let client = share_client().rejecting_credentials();
    let harness = share_harness(&client).await;
    let descriptor = harness.descriptor(SourceKind::RemoteShare, SHARE);

    let result = harness.orchestrator.run(&descriptor).await;
    assert!(matches!(result, Err(CrawlError::Authentication(_))));

    let runs = harness.catalog.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].success, Some(false));
    assert!(runs[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("authentication failed"));
    assert!(harness.catalog.files().await.is_empty());
}
