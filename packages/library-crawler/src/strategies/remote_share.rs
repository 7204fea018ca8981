//! SMB shares, crawled by the remote crawling service.
//!
//! Discovery runs as a job inside the service. The job is cancelled
//! explicitly when the crawl stops before the service reports completion.
//!
//! The service matches its own include/exclude options as globs, while the
//! filter policy uses regexes. Jobs are therefore started unfiltered and
//! every file found is evaluated by the orchestrator.

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use smb_crawler_client::{
    SmbCrawlEvent, SmbCrawlerClient, SmbFileMetadata, StartCrawlRequest, StartCrawlResponse,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    ByteStream, CancelGuard, CrawlStrategy, DiscoveredItem, Discovery, DiscoveryFailure,
    FetchHandle,
};
use crate::credentials::{keys, Credentials};
use crate::error::{CrawlError, CrawlResult, ProviderError, ProviderResult};
use crate::model::{DiscoveredFile, SourceDescriptor, SourceKind};

pub type EventStream = BoxStream<'static, ProviderResult<SmbCrawlEvent>>;

/// Job protocol of the crawling service.
#[async_trait]
pub trait RemoteShareClient: Send + Sync {
    async fn start_crawl(&self, request: &StartCrawlRequest) -> ProviderResult<StartCrawlResponse>;

    async fn stream_crawl(&self, job_id: &str) -> ProviderResult<EventStream>;

    async fn download_file(&self, job_id: &str, file_id: &str) -> ProviderResult<ByteStream>;

    async fn cancel_crawl(&self, job_id: &str) -> ProviderResult<()>;
}

#[async_trait]
impl RemoteShareClient for SmbCrawlerClient {
    async fn start_crawl(&self, request: &StartCrawlRequest) -> ProviderResult<StartCrawlResponse> {
        Ok(SmbCrawlerClient::start_crawl(self, request).await?)
    }

    async fn stream_crawl(&self, job_id: &str) -> ProviderResult<EventStream> {
        let events = SmbCrawlerClient::stream_crawl(self, job_id).await?;
        Ok(events.map(|event| event.map_err(ProviderError::from)).boxed())
    }

    async fn download_file(&self, job_id: &str, file_id: &str) -> ProviderResult<ByteStream> {
        let bytes = SmbCrawlerClient::download_file(self, job_id, file_id).await?;
        Ok(bytes.map(|chunk| chunk.map_err(ProviderError::from)).boxed())
    }

    async fn cancel_crawl(&self, job_id: &str) -> ProviderResult<()> {
        Ok(SmbCrawlerClient::cancel_crawl(self, job_id).await?)
    }
}

/// Strategy for [`SourceKind::RemoteShare`].
#[derive(Clone)]
pub struct RemoteShareStrategy {
    client: Arc<dyn RemoteShareClient>,
}

impl RemoteShareStrategy {
    pub fn new(client: impl RemoteShareClient + 'static) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn from_arc(client: Arc<dyn RemoteShareClient>) -> Self {
        Self { client }
    }
}

/// `smb://host/share` + `docs/a.pdf` -> `smb://host/share/docs/a.pdf`
pub fn share_origin_uri(share_uri: &str, relative_path: &str) -> String {
    format!(
        "{}/{}",
        share_uri.trim().trim_end_matches('/'),
        relative_path.trim_start_matches('/')
    )
}

fn build_request(descriptor: &SourceDescriptor, username: &str, password: &str) -> StartCrawlRequest {
    StartCrawlRequest::new(descriptor.uri.trim(), username, password)
}

fn file_item(
    share_uri: &str,
    job_id: &str,
    meta: SmbFileMetadata,
    client: &Arc<dyn RemoteShareClient>,
) -> DiscoveredItem {
    let origin_uri = share_origin_uri(share_uri, &meta.relative_path);
    let mut file = DiscoveredFile::new(meta.file_id.clone(), meta.name, origin_uri)
        .with_relative_path(meta.relative_path)
        .with_size(meta.size);
    if let Some(modified) = meta.last_modified {
        file = file.with_last_modified(modified);
    }
    if let Some(mime) = meta.mime_type {
        file = file.with_mime_type(mime);
    }

    let client = Arc::clone(client);
    let job_id = job_id.to_string();
    let file_id = meta.file_id;
    let fetch = FetchHandle::new(async move { client.download_file(&job_id, &file_id).await });
    DiscoveredItem::new(file, fetch)
}

#[async_trait]
impl CrawlStrategy for RemoteShareStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::RemoteShare
    }

    fn label(&self) -> &'static str {
        "SMB"
    }

    async fn discover(
        &self,
        descriptor: &SourceDescriptor,
        credentials: &Credentials,
    ) -> CrawlResult<Discovery> {
        let username = credentials.value(keys::USERNAME);
        let password = credentials.value(keys::PASSWORD);
        let (Some(username), Some(password)) = (username, password) else {
            let missing: Vec<&str> = [
                (keys::USERNAME, username.is_none()),
                (keys::PASSWORD, password.is_none()),
            ]
            .into_iter()
            .filter_map(|(key, absent)| absent.then_some(key))
            .collect();
            return Err(CrawlError::MissingCredentials {
                kind: SourceKind::RemoteShare,
                missing: missing.join(", "),
            });
        };

        let request = build_request(descriptor, username, password);
        info!(uri = %request.uri, "Starting SMB crawl job");
        let job = self.client.start_crawl(&request).await.map_err(|e| {
            if e.is_auth() {
                CrawlError::Authentication(e)
            } else {
                CrawlError::Connect(e)
            }
        })?;
        let job_id = job.job_id;

        let cancel_client = Arc::clone(&self.client);
        let cancel_job = job_id.clone();
        let guard = CancelGuard::new(move || async move {
            if let Err(e) = cancel_client.cancel_crawl(&cancel_job).await {
                warn!(job_id = %cancel_job, error = %e, "Failed to cancel SMB crawl job");
            }
        });

        let mut events = match self.client.stream_crawl(&job_id).await {
            Ok(events) => events,
            Err(e) => {
                guard.cancel().await;
                return Err(CrawlError::Connect(e));
            }
        };

        let finished = guard.finished_flag();
        let client = Arc::clone(&self.client);
        let share_uri = descriptor.uri.trim().to_string();

        let items = stream! {
            loop {
                match events.next().await {
                    Some(Ok(SmbCrawlEvent::FileFound(meta))) => {
                        debug!(job_id = %job_id, path = %meta.relative_path, "SMB file found");
                        yield Ok(file_item(&share_uri, &job_id, meta, &client));
                    }
                    Some(Ok(SmbCrawlEvent::Progress(progress))) => {
                        debug!(
                            job_id = %job_id,
                            files_found = progress.files_found,
                            files_matched = progress.files_matched,
                            directory = ?progress.current_directory,
                            "SMB crawl progress"
                        );
                    }
                    Some(Ok(SmbCrawlEvent::Complete(done))) => {
                        finished.store(true, Ordering::SeqCst);
                        info!(
                            job_id = %job_id,
                            total_files = done.total_files,
                            total_matched = done.total_matched,
                            duration_ms = done.duration_ms,
                            "SMB crawl job complete"
                        );
                        break;
                    }
                    Some(Ok(SmbCrawlEvent::Error { message })) => {
                        finished.store(true, Ordering::SeqCst);
                        warn!(job_id = %job_id, error = %message, "SMB crawl job failed");
                        yield Err(DiscoveryFailure::new(message).at(share_uri.clone()));
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(job_id = %job_id, error = %e, "SMB event stream failed");
                        yield Err(DiscoveryFailure::from(e).at(share_uri.clone()));
                        break;
                    }
                    None => {
                        yield Err(
                            DiscoveryFailure::new("SMB event stream ended before the job completed")
                                .at(share_uri.clone()),
                        );
                        break;
                    }
                }
            }
        };

        Ok(Discovery::new(items.boxed()).with_cancel(guard))
    }
}
