//! Data carried through a crawl: the input descriptor, discovered files,
//! catalog records, audit entries, and the outcomes handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CrawlError, CrawlResult};
use crate::filter::{FileFilterConfig, FilterType};
use crate::ids::{AuditEntryId, CrawlerId, FileId, LibraryId, RunId};

pub const DEFAULT_MAX_DEPTH: u32 = 2;
pub const DEFAULT_MAX_PAGES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Web,
    RemoteShare,
    CloudStorage,
    GenericApi,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Web => "web",
            SourceKind::RemoteShare => "remoteShare",
            SourceKind::CloudStorage => "cloudStorage",
            SourceKind::GenericApi => "genericApi",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "web" | "http" => Ok(SourceKind::Web),
            "remoteshare" | "smb" => Ok(SourceKind::RemoteShare),
            "cloudstorage" | "box" => Ok(SourceKind::CloudStorage),
            "genericapi" | "api" => Ok(SourceKind::GenericApi),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

/// Immutable input to one crawl invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub crawler_id: CrawlerId,
    pub library_id: LibraryId,
    pub uri: String,
    pub kind: SourceKind,
    pub max_depth: u32,
    pub max_pages: u32,
    #[serde(default)]
    pub filter_config: Option<FileFilterConfig>,
    #[serde(default)]
    pub provider_config: Option<serde_json::Value>,
}

impl SourceDescriptor {
    pub fn new(
        crawler_id: CrawlerId,
        library_id: LibraryId,
        kind: SourceKind,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            crawler_id,
            library_id,
            uri: uri.into(),
            kind,
            max_depth: DEFAULT_MAX_DEPTH,
            max_pages: DEFAULT_MAX_PAGES,
            filter_config: None,
            provider_config: None,
        }
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn with_filter(mut self, filter: FileFilterConfig) -> Self {
        self.filter_config = Some(filter);
        self
    }

    pub fn with_provider_config(mut self, config: serde_json::Value) -> Self {
        self.provider_config = Some(config);
        self
    }

    /// Structural checks shared by every source kind. Strategies add their own.
    pub fn validate(&self) -> CrawlResult<()> {
        if self.max_pages == 0 {
            return Err(CrawlError::invalid("maxPages must be at least 1"));
        }
        if self.uri.trim().is_empty() && self.kind != SourceKind::GenericApi {
            return Err(CrawlError::invalid("uri is empty"));
        }
        if let Some(filter) = &self.filter_config {
            filter.validate()?;
        }
        Ok(())
    }
}

/// A file as advertised by a provider, before any bytes are fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredFile {
    pub provider_file_id: String,
    pub name: String,
    /// Path relative to the crawl root; filter patterns match against this or the name.
    pub relative_path: String,
    /// Identity of the file within its crawler.
    pub origin_uri: String,
    /// `None` when the provider does not advertise a size up front.
    pub byte_size: Option<u64>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub mime_type_hint: Option<String>,
}

impl DiscoveredFile {
    pub fn new(
        provider_file_id: impl Into<String>,
        name: impl Into<String>,
        origin_uri: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            provider_file_id: provider_file_id.into(),
            relative_path: name.clone(),
            name,
            origin_uri: origin_uri.into(),
            byte_size: None,
            last_modified_at: None,
            mime_type_hint: None,
        }
    }

    pub fn with_relative_path(mut self, path: impl Into<String>) -> Self {
        self.relative_path = path.into();
        self
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.byte_size = Some(bytes);
        self
    }

    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified_at = Some(at);
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type_hint = Some(mime.into());
        self
    }
}

/// A file record as held by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFileRecord {
    pub id: FileId,
    pub library_id: LibraryId,
    pub crawler_id: CrawlerId,
    pub origin_uri: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
    pub origin_modification_date: Option<DateTime<Utc>>,
    pub origin_file_hash: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub processing_error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredFileRecord {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Create-or-update payload keyed by `(crawler_id, origin_uri)`.
///
/// Upserting always clears `archived_at`. A `None` hash leaves the stored
/// hash untouched; `processing_error_message` is written as given.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpsert {
    pub library_id: LibraryId,
    pub crawler_id: CrawlerId,
    pub origin_uri: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
    pub origin_modification_date: Option<DateTime<Utc>>,
    pub origin_file_hash: Option<String>,
    pub processing_error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditKind {
    Created,
    Updated,
    Skipped,
    Omitted,
    Error,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Created => "created",
            AuditKind::Updated => "updated",
            AuditKind::Skipped => "skipped",
            AuditKind::Omitted => "omitted",
            AuditKind::Error => "error",
        }
    }
}

impl std::str::FromStr for AuditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(AuditKind::Created),
            "updated" => Ok(AuditKind::Updated),
            "skipped" => Ok(AuditKind::Skipped),
            "omitted" => Ok(AuditKind::Omitted),
            "error" => Ok(AuditKind::Error),
            other => Err(format!("unknown audit kind: {}", other)),
        }
    }
}

/// An audit entry before the catalog assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditEntry {
    pub library_id: LibraryId,
    pub crawler_run_id: Option<RunId>,
    pub file_id: Option<FileId>,
    pub kind: AuditKind,
    pub message: String,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub filter_type: Option<String>,
    pub filter_value: Option<String>,
}

impl NewAuditEntry {
    pub fn new(library_id: LibraryId, kind: AuditKind, message: impl Into<String>) -> Self {
        Self {
            library_id,
            crawler_run_id: None,
            file_id: None,
            kind,
            message: message.into(),
            file_path: None,
            file_name: None,
            file_size: None,
            filter_type: None,
            filter_value: None,
        }
    }

    pub fn for_run(mut self, run_id: Option<RunId>) -> Self {
        self.crawler_run_id = run_id;
        self
    }

    pub fn for_file(mut self, file_id: Option<FileId>) -> Self {
        self.file_id = file_id;
        self
    }

    /// Attach the item's location and advertised size.
    pub fn at(mut self, file: &DiscoveredFile) -> Self {
        self.file_path = Some(file.origin_uri.clone());
        self.file_name = Some(file.name.clone());
        self.file_size = file.byte_size;
        self
    }

    pub fn with_filter(mut self, filter_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter_type = Some(filter_type.into());
        self.filter_value = Some(value.into());
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.file_size = size;
        self
    }
}

/// An appended audit entry. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub entry: NewAuditEntry,
}

/// One execution of a crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerRun {
    pub id: RunId,
    pub crawler_id: CrawlerId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub pages_crawled: u64,
}

impl CrawlerRun {
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Normalised per-item result handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CrawlOutcome {
    /// New or changed content was stored; downstream processing should run.
    #[serde(rename_all = "camelCase")]
    Saved {
        file_id: FileId,
        name: String,
        origin_uri: String,
        mime_type: String,
        was_updated: bool,
        should_warn: bool,
        hints: String,
    },
    /// Content hash matched the stored record; nothing was rewritten.
    #[serde(rename_all = "camelCase")]
    SkippedUnchanged {
        file_id: FileId,
        name: String,
        origin_uri: String,
        mime_type: String,
        hints: String,
    },
    #[serde(rename_all = "camelCase")]
    OmittedByFilter {
        name: String,
        origin_uri: String,
        filter_type: FilterType,
        filter_value: String,
        reason: String,
        /// Record archived because the filter now excludes it.
        archived_file_id: Option<FileId>,
    },
    #[serde(rename_all = "camelCase")]
    TooLarge {
        file_id: FileId,
        name: String,
        origin_uri: String,
        size: u64,
        reason: String,
        hints: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        hints: String,
        name: Option<String>,
        origin_uri: Option<String>,
    },
}

impl CrawlOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlOutcome::Saved { .. } => "saved",
            CrawlOutcome::SkippedUnchanged { .. } => "skippedUnchanged",
            CrawlOutcome::OmittedByFilter { .. } => "omittedByFilter",
            CrawlOutcome::TooLarge { .. } => "tooLarge",
            CrawlOutcome::Error { .. } => "error",
        }
    }

    pub fn origin_uri(&self) -> Option<&str> {
        match self {
            CrawlOutcome::Saved { origin_uri, .. }
            | CrawlOutcome::SkippedUnchanged { origin_uri, .. }
            | CrawlOutcome::OmittedByFilter { origin_uri, .. }
            | CrawlOutcome::TooLarge { origin_uri, .. } => Some(origin_uri),
            CrawlOutcome::Error { origin_uri, .. } => origin_uri.as_deref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CrawlOutcome::Error { .. })
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub pages_crawled: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped_unchanged: u64,
    pub omitted: u64,
    pub too_large: u64,
    pub errors: u64,
    /// Set when the crawl could not start; no outcomes were produced.
    pub fatal: Option<String>,
    pub error_messages: Vec<String>,
}

impl CrawlReport {
    pub fn record(&mut self, outcome: &CrawlOutcome) {
        self.pages_crawled += 1;
        match outcome {
            CrawlOutcome::Saved { was_updated: true, .. } => self.updated += 1,
            CrawlOutcome::Saved { .. } => self.created += 1,
            CrawlOutcome::SkippedUnchanged { .. } => self.skipped_unchanged += 1,
            CrawlOutcome::OmittedByFilter { .. } => self.omitted += 1,
            CrawlOutcome::TooLarge { .. } => self.too_large += 1,
            CrawlOutcome::Error {
                message,
                origin_uri,
                ..
            } => {
                self.errors += 1;
                self.error_messages.push(match origin_uri {
                    Some(uri) => format!("{}: {}", uri, message),
                    None => message.clone(),
                });
            }
        }
    }

    pub fn success(&self) -> bool {
        self.fatal.is_none() && self.errors == 0
    }

    /// Joined error lines, `None` for a clean run.
    pub fn error_summary(&self) -> Option<String> {
        if let Some(fatal) = &self.fatal {
            return Some(fatal.clone());
        }
        if self.error_messages.is_empty() {
            None
        } else {
            Some(self.error_messages.join("\n"))
        }
    }
}
