//! Drives one crawl end-to-end.
//!
//! The orchestrator selects the strategy for a descriptor, pulls discovered
//! items one at a time and runs each through the filter policy, the size
//! guard and the change detector before persisting it. Every item yields
//! exactly one [`CrawlOutcome`]; failures inside an item become `error`
//! outcomes and the crawl moves on. Only failures to start the crawl are
//! returned as [`CrawlError`], and they end the stream.
//!
//! ```rust,ignore
//! let orchestrator = Orchestrator::new(catalog, storage, credentials, registry)
//!     .with_settings(&settings);
//! let report = orchestrator.run(&descriptor).await?;
//! ```

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::audit::AuditTrail;
use crate::change::{decide, ChangeDecision, ChangeDetector, StagedContent};
use crate::config::CrawlerSettings;
use crate::credentials::CredentialStore;
use crate::error::{CrawlError, CrawlResult, ItemResult};
use crate::filter::{format_file_size, FileFilter};
use crate::ids::{CrawlerId, RunId};
use crate::mime::resolve_mime_type;
use crate::model::{
    AuditKind, CrawlOutcome, CrawlReport, CrawlerRun, DiscoveredFile, FileUpsert, NewAuditEntry,
    SourceDescriptor, StoredFileRecord,
};
use crate::size_guard::SizeGuard;
use crate::strategies::{
    CrawlStrategy, DiscoveredItem, Discovery, DiscoveryFailure, FetchHandle, StrategyRegistry,
};
use crate::traits::{ByteStorage, Catalog};

/// Lazy outcome sequence of one crawl.
pub type OutcomeStream<'a> = BoxStream<'a, CrawlResult<CrawlOutcome>>;

/// Per-crawl state shared by the item handlers.
struct CrawlContext<'a> {
    descriptor: &'a SourceDescriptor,
    run_id: Option<RunId>,
    label: &'static str,
    filter: Option<FileFilter>,
}

impl CrawlContext<'_> {
    fn crawler_id(&self) -> CrawlerId {
        self.descriptor.crawler_id
    }

    fn upsert(&self, file: &DiscoveredFile, mime_type: &str, size: u64) -> FileUpsert {
        FileUpsert {
            library_id: self.descriptor.library_id,
            crawler_id: self.descriptor.crawler_id,
            origin_uri: file.origin_uri.clone(),
            name: file.name.clone(),
            mime_type: mime_type.to_string(),
            size: Some(size),
            origin_modification_date: file.last_modified_at,
            origin_file_hash: None,
            processing_error_message: None,
        }
    }

    fn entry(&self, kind: AuditKind, message: impl Into<String>) -> NewAuditEntry {
        NewAuditEntry::new(self.descriptor.library_id, kind, message).for_run(self.run_id)
    }
}

pub struct Orchestrator {
    catalog: Arc<dyn Catalog>,
    storage: Arc<dyn ByteStorage>,
    credentials: Arc<dyn CredentialStore>,
    registry: StrategyRegistry,
    audit: AuditTrail,
    detector: ChangeDetector,
    guard: SizeGuard,
    archive_missing: bool,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        storage: Arc<dyn ByteStorage>,
        credentials: Arc<dyn CredentialStore>,
        registry: StrategyRegistry,
    ) -> Self {
        let defaults = CrawlerSettings::default();
        Self {
            audit: AuditTrail::new(catalog.clone()),
            catalog,
            storage,
            credentials,
            registry,
            detector: ChangeDetector::new(defaults.staging_dir.clone()),
            guard: defaults.size_guard(),
            archive_missing: defaults.archive_missing,
        }
    }

    /// Apply size limits, staging directory and sweep behaviour.
    pub fn with_settings(mut self, settings: &CrawlerSettings) -> Self {
        self.detector = ChangeDetector::new(settings.staging_dir.clone());
        self.guard = settings.size_guard();
        self.archive_missing = settings.archive_missing;
        self
    }

    pub fn with_size_guard(mut self, guard: SizeGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_change_detector(mut self, detector: ChangeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    /// Crawl a source, yielding one outcome per processed item.
    ///
    /// Nothing happens until the stream is polled. Dropping the stream early
    /// stops discovery after the in-flight item. With a `run_id`, the run is
    /// re-read before each item and the crawl ends once the run was stopped.
    pub fn crawl<'a>(
        &'a self,
        descriptor: &'a SourceDescriptor,
        run_id: Option<RunId>,
    ) -> OutcomeStream<'a> {
        stream! {
            let (strategy, discovery) = match self.start(descriptor).await {
                Ok(started) => started,
                Err(e) => {
                    error!(crawler_id = %descriptor.crawler_id, error = %e, "Crawl failed to start");
                    yield Err(e);
                    return;
                }
            };

            let filter = descriptor
                .filter_config
                .as_ref()
                .filter(|config| strategy.applies_filters() && !config.is_empty())
                .map(|config| FileFilter::new(config.clone()));
            let ctx = CrawlContext {
                descriptor,
                run_id,
                label: strategy.label(),
                filter,
            };

            let mut discovery = discovery;
            let max_pages = u64::from(descriptor.max_pages);
            let mut processed = 0u64;
            let mut seen: HashSet<String> = HashSet::new();
            let mut exhausted = false;
            let mut had_failures = false;
            let mut stopped = false;

            while processed < max_pages {
                if let Some(run_id) = run_id {
                    if !self.run_is_active(run_id).await {
                        stopped = true;
                        break;
                    }
                }
                let Some(next) = discovery.next().await else {
                    exhausted = true;
                    break;
                };
                processed += 1;

                let outcome = match next {
                    Ok(item) => {
                        seen.insert(item.file.origin_uri.clone());
                        self.process_item(&ctx, item).await
                    }
                    Err(failure) => {
                        had_failures = true;
                        self.discovery_failure(&ctx, failure).await
                    }
                };
                debug!(
                    crawler_id = %descriptor.crawler_id,
                    kind = outcome.kind(),
                    origin_uri = outcome.origin_uri().unwrap_or_default(),
                    "Processed item"
                );
                yield Ok(outcome);
            }

            if stopped {
                info!(
                    crawler_id = %descriptor.crawler_id,
                    processed,
                    "Run was stopped, ending discovery"
                );
            } else if !exhausted {
                info!(
                    crawler_id = %descriptor.crawler_id,
                    max_pages,
                    "Page limit reached, stopping discovery"
                );
            }
            discovery.stop().await;

            if exhausted && !had_failures && self.archive_missing {
                self.sweep_missing(&ctx, &seen).await;
            }
        }
        .boxed()
    }

    /// Crawl a source inside a catalog run and return its report.
    pub async fn run(&self, descriptor: &SourceDescriptor) -> CrawlResult<CrawlReport> {
        self.run_with(descriptor, |_| {}).await
    }

    /// Like [`run`](Self::run), handing each outcome to `on_outcome` as it arrives.
    #[instrument(skip(self, descriptor, on_outcome), fields(crawler_id = %descriptor.crawler_id, kind = %descriptor.kind))]
    pub async fn run_with<F>(
        &self,
        descriptor: &SourceDescriptor,
        mut on_outcome: F,
    ) -> CrawlResult<CrawlReport>
    where
        F: FnMut(&CrawlOutcome) + Send,
    {
        let run = self.catalog.start_run(descriptor.crawler_id).await?;
        info!(run_id = %run.id, uri = %descriptor.uri, "Crawler run started");

        let mut report = CrawlReport::default();
        let mut fatal = None;
        {
            let mut outcomes = self.crawl(descriptor, Some(run.id));
            while let Some(next) = outcomes.next().await {
                match next {
                    Ok(outcome) => {
                        report.record(&outcome);
                        on_outcome(&outcome);
                    }
                    Err(e) => {
                        fatal = Some(e);
                        break;
                    }
                }
            }
        }

        if let Some(e) = &fatal {
            report.fatal = Some(e.to_string());
        }
        let finished = self.catalog.finish_run(run.id, &report).await?;
        info!(
            run_id = %run.id,
            pages = report.pages_crawled,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped_unchanged,
            omitted = report.omitted,
            too_large = report.too_large,
            errors = report.errors,
            success = finished.success.unwrap_or(false),
            "Crawler run finished"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Mark the crawler's unfinished run as stopped.
    pub async fn stop(&self, crawler_id: CrawlerId) -> CrawlResult<Option<CrawlerRun>> {
        let stopped = self.catalog.stop_run(crawler_id).await?;
        if let Some(run) = &stopped {
            info!(crawler_id = %crawler_id, run_id = %run.id, "Crawler run stopped");
        }
        Ok(stopped)
    }

    /// A run whose state cannot be read is treated as still active.
    async fn run_is_active(&self, run_id: RunId) -> bool {
        match self.catalog.run_is_active(run_id).await {
            Ok(active) => active,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Failed to read run state");
                true
            }
        }
    }

    async fn start(
        &self,
        descriptor: &SourceDescriptor,
    ) -> CrawlResult<(Arc<dyn CrawlStrategy>, Discovery)> {
        descriptor.validate()?;
        let strategy = self
            .registry
            .get(descriptor.kind)
            .ok_or(CrawlError::UnsupportedSource(descriptor.kind))?;
        let credentials = self.credentials.get(descriptor.crawler_id).await?;

        info!(
            crawler_id = %descriptor.crawler_id,
            strategy = strategy.label(),
            uri = %descriptor.uri,
            max_depth = descriptor.max_depth,
            max_pages = descriptor.max_pages,
            "Starting crawl"
        );
        let discovery = strategy.discover(descriptor, &credentials).await?;
        Ok((strategy, discovery))
    }

    async fn process_item(&self, ctx: &CrawlContext<'_>, item: DiscoveredItem) -> CrawlOutcome {
        let DiscoveredItem { file, fetch } = item;
        match self.try_process(ctx, &file, fetch).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                warn!(
                    crawler_id = %ctx.crawler_id(),
                    origin_uri = %file.origin_uri,
                    error = %message,
                    "Failed to process file"
                );
                self.audit
                    .record_best_effort(ctx.entry(AuditKind::Error, message.clone()).at(&file))
                    .await;
                CrawlOutcome::Error {
                    message,
                    hints: format!(
                        "Error processing {} file {} in crawler {}",
                        ctx.label,
                        file.origin_uri,
                        ctx.crawler_id()
                    ),
                    name: Some(file.name),
                    origin_uri: Some(file.origin_uri),
                }
            }
        }
    }

    async fn try_process(
        &self,
        ctx: &CrawlContext<'_>,
        file: &DiscoveredFile,
        fetch: FetchHandle,
    ) -> ItemResult<CrawlOutcome> {
        if let Some(filter) = &ctx.filter {
            let decision = filter.evaluate(file);
            if let (false, Some(filter_type)) = (decision.allowed, decision.filter_type) {
                let archived_file_id = self
                    .audit
                    .record_omitted(ctx.run_id, ctx.crawler_id(), ctx.descriptor.library_id, file, &decision)
                    .await?;
                debug!(origin_uri = %file.origin_uri, filter_type = %filter_type, "File filtered");
                return Ok(CrawlOutcome::OmittedByFilter {
                    name: file.name.clone(),
                    origin_uri: file.origin_uri.clone(),
                    filter_type,
                    filter_value: decision.filter_value.unwrap_or_default(),
                    reason: decision.reason.unwrap_or_default(),
                    archived_file_id,
                });
            }
        }

        let mime_type = resolve_mime_type(&file.name, file.mime_type_hint.as_deref());

        let mut should_warn = false;
        if let Some(size) = file.byte_size {
            let verdict = self.guard.check(size);
            if !verdict.acceptable {
                return self
                    .reject_too_large(ctx, file, &mime_type, size, verdict.reason.unwrap_or_default())
                    .await;
            }
            should_warn = verdict.should_warn;
        }

        let existing = self
            .catalog
            .find_file(ctx.crawler_id(), &file.origin_uri)
            .await?;
        let staged = self.detector.stage(fetch.fetch().await?).await?;

        // Sizes not advertised up front are checked once the bytes are local.
        if file.byte_size.is_none() {
            let verdict = self.guard.check(staged.size());
            if !verdict.acceptable {
                return self
                    .reject_too_large(
                        ctx,
                        file,
                        &mime_type,
                        staged.size(),
                        verdict.reason.unwrap_or_default(),
                    )
                    .await;
            }
            should_warn = verdict.should_warn;
        }
        if should_warn {
            warn!(
                origin_uri = %file.origin_uri,
                size = %format_file_size(staged.size()),
                "Large file, processing anyway"
            );
        }

        match (decide(existing.as_ref(), staged.hash()), existing) {
            (ChangeDecision::Unchanged, Some(record)) => {
                self.skip_unchanged(ctx, file, record, &staged).await
            }
            (decision, existing) => {
                let was_updated = decision == ChangeDecision::Update;
                self.save(ctx, file, existing, &mime_type, &staged, was_updated, should_warn)
                    .await
            }
        }
    }

    async fn skip_unchanged(
        &self,
        ctx: &CrawlContext<'_>,
        file: &DiscoveredFile,
        record: StoredFileRecord,
        staged: &StagedContent,
    ) -> ItemResult<CrawlOutcome> {
        self.catalog
            .touch_file(record.id, file.last_modified_at)
            .await?;

        let hints = format!(
            "{} crawler - file {} skipped (already processed with same hash) | Size: {} | Origin: {}",
            ctx.label,
            file.name,
            format_file_size(staged.size()),
            file.origin_uri
        );
        self.audit
            .record_best_effort(
                ctx.entry(AuditKind::Skipped, hints.clone())
                    .for_file(Some(record.id))
                    .at(file)
                    .with_size(Some(staged.size())),
            )
            .await;

        Ok(CrawlOutcome::SkippedUnchanged {
            file_id: record.id,
            name: file.name.clone(),
            origin_uri: file.origin_uri.clone(),
            mime_type: record.mime_type,
            hints,
        })
    }

    /// Bytes are placed before the hash is recorded, so a failed write is
    /// retried as a change on the next run.
    #[allow(clippy::too_many_arguments)]
    async fn save(
        &self,
        ctx: &CrawlContext<'_>,
        file: &DiscoveredFile,
        existing: Option<StoredFileRecord>,
        mime_type: &str,
        staged: &StagedContent,
        was_updated: bool,
        should_warn: bool,
    ) -> ItemResult<CrawlOutcome> {
        let file_id = match existing {
            Some(record) => record.id,
            None => {
                self.catalog
                    .upsert_file(ctx.upsert(file, mime_type, staged.size()))
                    .await?
                    .id
            }
        };
        self.storage
            .write_file_bytes(ctx.descriptor.library_id, file_id, staged.path())
            .await?;

        let mut upsert = ctx.upsert(file, mime_type, staged.size());
        upsert.origin_file_hash = Some(staged.hash().to_string());
        let record = self.catalog.upsert_file(upsert).await?;

        let (kind, verb) = if was_updated {
            (AuditKind::Updated, "updated")
        } else {
            (AuditKind::Created, "created")
        };
        self.audit
            .record_best_effort(
                ctx.entry(kind, format!("File \"{}\" {}", file.name, verb))
                    .for_file(Some(record.id))
                    .at(file)
                    .with_size(Some(staged.size())),
            )
            .await;
        debug!(file_id = %record.id, origin_uri = %file.origin_uri, was_updated, "File saved");

        Ok(CrawlOutcome::Saved {
            file_id: record.id,
            name: file.name.clone(),
            origin_uri: file.origin_uri.clone(),
            mime_type: record.mime_type,
            was_updated,
            should_warn,
            hints: format!("{} Crawler {} for file {}", ctx.label, ctx.crawler_id(), file.name),
        })
    }

    async fn reject_too_large(
        &self,
        ctx: &CrawlContext<'_>,
        file: &DiscoveredFile,
        mime_type: &str,
        size: u64,
        reason: String,
    ) -> ItemResult<CrawlOutcome> {
        warn!(origin_uri = %file.origin_uri, size, reason = %reason, "File too large");

        let message = format!("File too large: {}", reason);
        let mut upsert = ctx.upsert(file, mime_type, size);
        upsert.processing_error_message = Some(message.clone());
        let record = self.catalog.upsert_file(upsert).await?;

        self.audit
            .record_best_effort(
                ctx.entry(AuditKind::Error, message)
                    .for_file(Some(record.id))
                    .at(file)
                    .with_size(Some(size)),
            )
            .await;

        Ok(CrawlOutcome::TooLarge {
            file_id: record.id,
            name: file.name.clone(),
            origin_uri: file.origin_uri.clone(),
            size,
            reason,
            hints: format!(
                "{} Crawler {} - file {} skipped due to size limit",
                ctx.label,
                ctx.crawler_id(),
                file.name
            ),
        })
    }

    async fn discovery_failure(
        &self,
        ctx: &CrawlContext<'_>,
        failure: DiscoveryFailure,
    ) -> CrawlOutcome {
        let location = failure.origin_uri.clone().unwrap_or_else(|| ctx.descriptor.uri.clone());
        warn!(
            crawler_id = %ctx.crawler_id(),
            location = %location,
            error = %failure.message,
            "Discovery failure"
        );

        let mut entry = ctx.entry(AuditKind::Error, failure.message.clone());
        entry.file_path = failure.origin_uri.clone();
        entry.file_name = failure.name.clone();
        self.audit.record_best_effort(entry).await;

        CrawlOutcome::Error {
            message: failure.message,
            hints: format!(
                "Error processing {} file {} in crawler {}",
                ctx.label,
                location,
                ctx.crawler_id()
            ),
            name: failure.name,
            origin_uri: failure.origin_uri,
        }
    }

    /// Archive active records the source did not list in this crawl.
    async fn sweep_missing(&self, ctx: &CrawlContext<'_>, seen: &HashSet<String>) {
        let active = match self.catalog.list_active_files(ctx.crawler_id()).await {
            Ok(active) => active,
            Err(e) => {
                warn!(crawler_id = %ctx.crawler_id(), error = %e, "Could not list files for sweep");
                return;
            }
        };

        let mut archived = 0usize;
        for record in active.iter().filter(|r| !seen.contains(&r.origin_uri)) {
            match self
                .audit
                .record_missing(
                    ctx.run_id,
                    ctx.descriptor.library_id,
                    record.id,
                    &record.origin_uri,
                    &record.name,
                )
                .await
            {
                Ok(()) => archived += 1,
                Err(e) => warn!(file_id = %record.id, error = %e, "Failed to archive missing file"),
            }
        }
        if archived > 0 {
            info!(crawler_id = %ctx.crawler_id(), archived, "Archived files no longer at the source");
        }
    }
}
