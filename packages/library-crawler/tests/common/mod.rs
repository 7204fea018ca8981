//! Shared setup for orchestrator integration tests.
//!
//! Everything runs against in-memory collaborators and mock provider clients.

#![allow(dead_code)]

use futures::StreamExt;
use library_crawler::credentials::keys;
use library_crawler::stores::{MemoryByteStorage, MemoryCatalog};
use library_crawler::{
    ChangeDetector, CrawlOutcome, CrawlResult, CrawlerId, CredentialStore, Credentials,
    LibraryId, MemoryCredentialStore, Orchestrator, SizeGuard, SourceDescriptor, SourceKind,
    StoredFileRecord, StrategyRegistry,
};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub catalog: MemoryCatalog,
    pub storage: MemoryByteStorage,
    pub credentials: MemoryCredentialStore,
    pub orchestrator: Orchestrator,
    pub crawler_id: CrawlerId,
    pub library_id: LibraryId,
    guard: SizeGuard,
    staging: TempDir,
}

impl Harness {
    pub fn new(registry: StrategyRegistry) -> Self {
        Self::with_guard(registry, SizeGuard::default())
    }

    pub fn with_guard(registry: StrategyRegistry, guard: SizeGuard) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let catalog = MemoryCatalog::new();
        let storage = MemoryByteStorage::new();
        let credentials = MemoryCredentialStore::new();
        let staging = TempDir::new().expect("staging dir");
        let orchestrator =
            build_orchestrator(&catalog, &storage, &credentials, registry, guard, &staging);

        Self {
            catalog,
            storage,
            credentials,
            orchestrator,
            crawler_id: CrawlerId::new(),
            library_id: LibraryId::new(),
            guard,
            staging,
        }
    }

    /// Swap the provider strategies while keeping catalog, storage and credentials.
    pub fn replace_registry(&mut self, registry: StrategyRegistry) {
        self.orchestrator = build_orchestrator(
            &self.catalog,
            &self.storage,
            &self.credentials,
            registry,
            self.guard,
            &self.staging,
        );
    }

    pub fn descriptor(&self, kind: SourceKind, uri: &str) -> SourceDescriptor {
        SourceDescriptor::new(self.crawler_id, self.library_id, kind, uri)
    }

    pub async fn set_credentials(&self, credentials: Credentials) {
        self.credentials
            .put(self.crawler_id, credentials)
            .await
            .expect("store credentials");
    }

    pub async fn smb_credentials(&self) {
        self.set_credentials(
            Credentials::new()
                .with(keys::USERNAME, "crawler")
                .with(keys::PASSWORD, "hunter2"),
        )
        .await;
    }

    pub async fn box_token(&self) {
        self.set_credentials(Credentials::new().with(keys::BOX_TOKEN, "t0ken"))
            .await;
    }

    /// Drain a crawl, stopping at the first fatal error.
    pub async fn crawl(&self, descriptor: &SourceDescriptor) -> CrawlResult<Vec<CrawlOutcome>> {
        let mut stream = self.orchestrator.crawl(descriptor, None);
        let mut outcomes = Vec::new();
        while let Some(next) = stream.next().await {
            outcomes.push(next?);
        }
        Ok(outcomes)
    }

    pub async fn active_files(&self) -> Vec<StoredFileRecord> {
        self.catalog
            .files()
            .await
            .into_iter()
            .filter(|f| !f.is_archived())
            .collect()
    }

    pub async fn file_by_uri(&self, origin_uri: &str) -> Option<StoredFileRecord> {
        self.catalog
            .files()
            .await
            .into_iter()
            .find(|f| f.origin_uri == origin_uri)
    }

    pub async fn stored_bytes(&self, origin_uri: &str) -> Option<Vec<u8>> {
        let record = self.file_by_uri(origin_uri).await?;
        self.storage.get(self.library_id, record.id).await
    }
}

fn build_orchestrator(
    catalog: &MemoryCatalog,
    storage: &MemoryByteStorage,
    credentials: &MemoryCredentialStore,
    registry: StrategyRegistry,
    guard: SizeGuard,
    staging: &TempDir,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(catalog.clone()),
        Arc::new(storage.clone()),
        Arc::new(credentials.clone()),
        registry,
    )
    .with_size_guard(guard)
    .with_change_detector(ChangeDetector::new(staging.path()))
}

pub fn kinds(outcomes: &[CrawlOutcome]) -> Vec<&'static str> {
    outcomes.iter().map(CrawlOutcome::kind).collect()
}
