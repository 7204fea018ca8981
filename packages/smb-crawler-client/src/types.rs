use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /crawl/start`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCrawlRequest {
    pub uri: String,
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size_bytes: Option<u64>,
}

impl StartCrawlRequest {
    pub fn new(
        uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
            include_patterns: None,
            exclude_patterns: None,
            max_file_size_bytes: None,
        }
    }

    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Self {
        if !patterns.is_empty() {
            self.include_patterns = Some(patterns);
        }
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        if !patterns.is_empty() {
            self.exclude_patterns = Some(patterns);
        }
        self
    }

    pub fn with_max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = Some(bytes);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCrawlResponse {
    pub job_id: String,
    pub stream_url: String,
}

/// Metadata for a file discovered by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmbFileMetadata {
    pub file_id: String,
    pub name: String,
    pub relative_path: String,
    pub size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmbCrawlProgress {
    pub files_found: u64,
    pub files_matched: u64,
    pub total_bytes: u64,
    #[serde(default)]
    pub current_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmbCrawlComplete {
    pub total_files: u64,
    pub total_matched: u64,
    pub total_bytes: u64,
    pub duration_ms: u64,
}

/// A typed event from `GET /crawl/{jobId}/stream`.
#[derive(Debug, Clone, PartialEq)]
pub enum SmbCrawlEvent {
    FileFound(SmbFileMetadata),
    Progress(SmbCrawlProgress),
    Complete(SmbCrawlComplete),
    Error { message: String },
}
