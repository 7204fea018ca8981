//! Incremental Document Crawl and Sync Core
//!
//! Crawls a content source (web site, SMB share, Box folder tree, JSON API),
//! decides per file whether it is new, changed, unchanged, filtered out or
//! too large, persists what changed and records every decision in an audit
//! trail.
//!
//! # Usage
//!
//! ```rust,ignore
//! use library_crawler::{Orchestrator, SourceDescriptor, SourceKind, StrategyRegistry};
//! use library_crawler::stores::{MemoryByteStorage, MemoryCatalog};
//! use library_crawler::credentials::MemoryCredentialStore;
//! use library_crawler::testing::MockWebClient;
//!
//! let registry = StrategyRegistry::new().with(WebStrategy::new(MockWebClient::new()));
//! let orchestrator = Orchestrator::new(
//!     Arc::new(MemoryCatalog::new()),
//!     Arc::new(MemoryByteStorage::new()),
//!     Arc::new(MemoryCredentialStore::new()),
//!     registry,
//! );
//!
//! let descriptor = SourceDescriptor::new(crawler_id, library_id, SourceKind::Web, "https://example.com/");
//! let report = orchestrator.run(&descriptor).await?;
//! ```
//!
//! # Modules
//!
//! - [`orchestrator`] - Drives one crawl and yields per-item outcomes
//! - [`strategies`] - One discovery strategy per source kind
//! - [`filter`] - Include/exclude/size/MIME filter policy
//! - [`size_guard`] - Warn and reject thresholds applied before download
//! - [`change`] - Content hashing and change decisions
//! - [`audit`] - Append-only audit trail
//! - [`credentials`] - Per-crawler credential store
//! - [`traits`] - Catalog and byte storage interfaces
//! - [`stores`] - Catalog and storage implementations
//! - [`testing`] - Mock provider clients for testing

pub mod audit;
pub mod change;
pub mod config;
pub mod credentials;
pub mod error;
pub mod filter;
pub mod ids;
pub mod mime;
pub mod model;
pub mod orchestrator;
pub mod size_guard;
pub mod stores;
pub mod strategies;
pub mod testing;
pub mod traits;

// Re-export core types at crate root
pub use audit::AuditTrail;
pub use change::{ChangeDecision, ChangeDetector};
pub use config::CrawlerSettings;
pub use credentials::{
    CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore, SecretString,
};
pub use error::{
    CatalogError, ConfigError, CrawlError, CrawlResult, CredentialError, ItemError, ProviderError,
    StorageError,
};
pub use filter::{FileFilter, FileFilterConfig, FilterDecision, FilterType};
pub use ids::{AuditEntryId, CrawlerId, FileId, LibraryId, RunId};
pub use model::{
    AuditEntry, AuditKind, CrawlOutcome, CrawlReport, CrawlerRun, DiscoveredFile, FileUpsert,
    NewAuditEntry, SourceDescriptor, SourceKind, StoredFileRecord,
};
pub use orchestrator::{OutcomeStream, Orchestrator};
pub use size_guard::{SizeGuard, SizeVerdict};
pub use strategies::{
    CloudStorageStrategy, CrawlStrategy, Discovery, GenericApiStrategy, RemoteShareStrategy,
    StrategyRegistry, WebStrategy,
};
pub use traits::{ByteStorage, Catalog};
