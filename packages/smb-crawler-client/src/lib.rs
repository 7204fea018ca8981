//! Pure client for the SMB crawling job service.
//!
//! The service mounts a share, walks it, and reports discovered files as a
//! server-sent event stream. Files are downloaded through the service by id.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use smb_crawler_client::{SmbCrawlerClient, StartCrawlRequest, SmbCrawlEvent};
//!
//! let client = SmbCrawlerClient::new("http://localhost:3006");
//! let job = client
//!     .start_crawl(&StartCrawlRequest::new("smb://nas/docs", "user", "secret"))
//!     .await?;
//!
//! let mut events = client.stream_crawl(&job.job_id).await?;
//! while let Some(event) = events.next().await {
//!     if let SmbCrawlEvent::FileFound(file) = event? {
//!         println!("{}", file.relative_path);
//!     }
//! }
//! ```

pub mod error;
pub mod events;
pub mod types;

pub use error::{Result, SmbCrawlerError};
pub use events::SmbEventStream;
pub use types::{
    SmbCrawlComplete, SmbCrawlEvent, SmbCrawlProgress, SmbFileMetadata, StartCrawlRequest,
    StartCrawlResponse,
};

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct SmbCrawlerClient {
    client: reqwest::Client,
    /// Client without a total timeout, used for long-lived event streams and downloads.
    streaming_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl SmbCrawlerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            streaming_client: reqwest::Client::new(),
            base_url,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a crawl job. The service mounts the share before answering, so
    /// bad credentials or an unreachable share surface here.
    pub async fn start_crawl(&self, request: &StartCrawlRequest) -> Result<StartCrawlResponse> {
        let url = format!("{}/crawl/start", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SmbCrawlerError::Api {
                status: status.as_u16(),
                message: service_error_message(&body, status.as_u16()),
            });
        }

        let started: StartCrawlResponse = resp.json().await?;
        tracing::info!(job_id = %started.job_id, uri = %request.uri, "SMB crawl job started");
        Ok(started)
    }

    /// Open the event stream of a job.
    pub async fn stream_crawl(&self, job_id: &str) -> Result<SmbEventStream> {
        let url = format!("{}/crawl/{}/stream", self.base_url, job_id);
        let resp = self
            .streaming_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SmbCrawlerError::Api {
                status: status.as_u16(),
                message: service_error_message(&body, status.as_u16()),
            });
        }

        Ok(SmbEventStream::new(resp.bytes_stream()))
    }

    /// Download the content of a discovered file as a byte stream.
    pub async fn download_file(
        &self,
        job_id: &str,
        file_id: &str,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        let url = format!("{}/files/{}/{}", self.base_url, job_id, file_id);
        let resp = self.streaming_client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SmbCrawlerError::Api {
                status: status.as_u16(),
                message: format!("Failed to download file: HTTP {}", status.as_u16()),
            });
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(SmbCrawlerError::from))
            .boxed())
    }

    /// Cancel a job and release its mount on the service side.
    pub async fn cancel_crawl(&self, job_id: &str) -> Result<()> {
        let url = format!("{}/crawl/{}", self.base_url, job_id);
        let resp = self
            .client
            .delete(&url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SmbCrawlerError::Api {
                status: status.as_u16(),
                message: service_error_message(&body, status.as_u16()),
            });
        }

        tracing::info!(job_id, "SMB crawl job cancelled");
        Ok(())
    }

    /// Returns false on any failure, never errors.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "SMB crawler health check failed");
                false
            }
        }
    }
}

/// The service answers errors as `{"error": "..."}`.
fn service_error_message(body: &str, status: u16) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                format!("Crawler service returned {}", status)
            } else {
                body.to_string()
            }
        })
}
