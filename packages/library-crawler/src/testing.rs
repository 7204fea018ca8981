//! Testing utilities including mock provider clients.
//!
//! These are useful for exercising crawls end-to-end without network access.
//! Every mock is cheap to clone; clones share state, so a test can keep one
//! handle for assertions while the strategy owns another.

use api_crawler::{ApiAuth, ApiCrawlerConfig, ApiItem};
use async_trait::async_trait;
use box_client::{BoxFolderItems, BoxItem, BoxItemType};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use smb_crawler_client::{
    SmbCrawlComplete, SmbCrawlEvent, SmbFileMetadata, StartCrawlRequest, StartCrawlResponse,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ProviderError, ProviderResult};
use crate::strategies::cloud_storage::{CloudAuth, CloudStorageClient, CloudStorageConnector};
use crate::strategies::generic_api::{ApiItemStream, ApiSource};
use crate::strategies::remote_share::{EventStream, RemoteShareClient};
use crate::strategies::web::{HtmlClient, WebPage};
use crate::strategies::ByteStream;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn single_chunk(bytes: Bytes) -> ByteStream {
    stream::once(async move { Ok(bytes) }).boxed()
}

fn not_found(what: &str) -> ProviderError {
    ProviderError::Api {
        status: 404,
        message: format!("{} not found", what),
    }
}

// ============================================================================
// Web
// ============================================================================

/// Serves canned pages by URL. Unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct MockWebClient {
    pages: Arc<Mutex<HashMap<String, WebPage>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockWebClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, page: WebPage) -> Self {
        self.add_page(page);
        self
    }

    /// Add or replace a page.
    pub fn add_page(&self, page: WebPage) {
        lock(&self.pages).insert(page.url.clone(), page);
    }

    /// Answer 500 for this URL.
    pub fn failing_on(self, url: impl Into<String>) -> Self {
        lock(&self.failing).insert(url.into());
        self
    }

    /// URLs requested so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }
}

#[async_trait]
impl HtmlClient for MockWebClient {
    async fn fetch_page(&self, url: &str) -> ProviderResult<WebPage> {
        lock(&self.fetched).push(url.to_string());
        if lock(&self.failing).contains(url) {
            return Err(ProviderError::Api {
                status: 500,
                message: format!("HTTP 500 fetching {}", url),
            });
        }
        lock(&self.pages)
            .get(url)
            .cloned()
            .ok_or_else(|| not_found(url))
    }
}

// ============================================================================
// Remote share
// ============================================================================

/// File metadata for [`MockRemoteShareClient::with_file`]. The size is
/// filled in from the content.
pub fn smb_file(file_id: &str, relative_path: &str) -> SmbFileMetadata {
    let name = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_string();
    SmbFileMetadata {
        file_id: file_id.to_string(),
        name,
        relative_path: relative_path.to_string(),
        size: 0,
        mime_type: None,
        last_modified: None,
        hash: None,
        download_url: None,
    }
}

#[derive(Default)]
struct ShareState {
    files: Vec<(SmbFileMetadata, Bytes)>,
    reject_credentials: bool,
    job_error: Option<String>,
    failing_downloads: HashSet<String>,
    requests: Vec<StartCrawlRequest>,
    downloads: Vec<String>,
    cancelled: Vec<String>,
    jobs: usize,
}

/// Emulates the crawling service: one `file-found` event per file, then
/// `complete` (or `error` when configured).
#[derive(Clone, Default)]
pub struct MockRemoteShareClient {
    state: Arc<Mutex<ShareState>>,
}

impl MockRemoteShareClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, mut meta: SmbFileMetadata, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        meta.size = content.len() as u64;
        lock(&self.state).files.push((meta, content));
        self
    }

    /// Change a file's content between runs.
    pub fn set_content(&self, file_id: &str, content: impl Into<Bytes>) {
        let content = content.into();
        let mut state = lock(&self.state);
        if let Some((meta, bytes)) = state.files.iter_mut().find(|(m, _)| m.file_id == file_id) {
            meta.size = content.len() as u64;
            *bytes = content;
        }
    }

    /// `start_crawl` answers 401.
    pub fn rejecting_credentials(self) -> Self {
        lock(&self.state).reject_credentials = true;
        self
    }

    /// End the event stream with an `error` event instead of `complete`.
    pub fn failing_with(self, message: impl Into<String>) -> Self {
        lock(&self.state).job_error = Some(message.into());
        self
    }

    pub fn failing_download(self, file_id: impl Into<String>) -> Self {
        lock(&self.state).failing_downloads.insert(file_id.into());
        self
    }

    pub fn start_calls(&self) -> usize {
        lock(&self.state).requests.len()
    }

    pub fn requests(&self) -> Vec<StartCrawlRequest> {
        lock(&self.state).requests.clone()
    }

    /// File ids downloaded so far.
    pub fn downloads(&self) -> Vec<String> {
        lock(&self.state).downloads.clone()
    }

    pub fn cancelled_jobs(&self) -> Vec<String> {
        lock(&self.state).cancelled.clone()
    }
}

#[async_trait]
impl RemoteShareClient for MockRemoteShareClient {
    async fn start_crawl(&self, request: &StartCrawlRequest) -> ProviderResult<StartCrawlResponse> {
        let mut state = lock(&self.state);
        state.requests.push(request.clone());
        if state.reject_credentials {
            return Err(ProviderError::Api {
                status: 401,
                message: "Authentication failed for share".into(),
            });
        }
        state.jobs += 1;
        let job_id = format!("job-{}", state.jobs);
        Ok(StartCrawlResponse {
            stream_url: format!("/crawl/{}/stream", job_id),
            job_id,
        })
    }

    async fn stream_crawl(&self, _job_id: &str) -> ProviderResult<EventStream> {
        let state = lock(&self.state);
        let mut events: Vec<SmbCrawlEvent> = state
            .files
            .iter()
            .map(|(meta, _)| SmbCrawlEvent::FileFound(meta.clone()))
            .collect();
        events.push(match &state.job_error {
            Some(message) => SmbCrawlEvent::Error {
                message: message.clone(),
            },
            None => SmbCrawlEvent::Complete(SmbCrawlComplete {
                total_files: state.files.len() as u64,
                total_matched: state.files.len() as u64,
                total_bytes: state.files.iter().map(|(_, b)| b.len() as u64).sum(),
                duration_ms: 1,
            }),
        });
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }

    async fn download_file(&self, _job_id: &str, file_id: &str) -> ProviderResult<ByteStream> {
        let mut state = lock(&self.state);
        state.downloads.push(file_id.to_string());
        if state.failing_downloads.contains(file_id) {
            return Err(ProviderError::Api {
                status: 500,
                message: format!("Failed to download file: {}", file_id),
            });
        }
        let bytes = state
            .files
            .iter()
            .find(|(meta, _)| meta.file_id == file_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| not_found(file_id))?;
        Ok(single_chunk(bytes))
    }

    async fn cancel_crawl(&self, job_id: &str) -> ProviderResult<()> {
        lock(&self.state).cancelled.push(job_id.to_string());
        Ok(())
    }
}

// ============================================================================
// Cloud storage
// ============================================================================

#[derive(Default)]
struct FolderState {
    folders: BTreeMap<String, (Vec<String>, Vec<String>)>,
    contents: HashMap<String, Bytes>,
    page_size: Option<usize>,
    reject_token: bool,
    auths: Vec<CloudAuth>,
    listings: Vec<(String, u64)>,
    downloads: Vec<String>,
}

/// In-memory folder tree. File ids are `<folder>-<name>` and each file's
/// content defaults to its name.
#[derive(Clone, Default)]
pub struct MockCloudStorageClient {
    state: Arc<Mutex<FolderState>>,
}

impl MockCloudStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_id(folder_id: &str, name: &str) -> String {
        format!("{}-{}", folder_id, name)
    }

    /// Subfolder names double as their ids.
    pub fn with_folder(self, folder_id: &str, subfolders: &[&str], files: &[&str]) -> Self {
        {
            let mut state = lock(&self.state);
            for name in files {
                state.contents.insert(
                    Self::file_id(folder_id, name),
                    Bytes::from(name.to_string()),
                );
            }
            state.folders.insert(
                folder_id.to_string(),
                (
                    subfolders.iter().map(|s| s.to_string()).collect(),
                    files.iter().map(|s| s.to_string()).collect(),
                ),
            );
        }
        self
    }

    pub fn set_content(&self, file_id: &str, content: impl Into<Bytes>) {
        lock(&self.state).contents.insert(file_id.to_string(), content.into());
    }

    /// Split listings into pages of `size` entries.
    pub fn with_page_size(self, size: usize) -> Self {
        lock(&self.state).page_size = Some(size.max(1));
        self
    }

    /// Every listing answers 401.
    pub fn rejecting_token(self) -> Self {
        lock(&self.state).reject_token = true;
        self
    }

    pub fn auths(&self) -> Vec<CloudAuth> {
        lock(&self.state).auths.clone()
    }

    /// `(folder_id, offset)` of every listing request.
    pub fn listings(&self) -> Vec<(String, u64)> {
        lock(&self.state).listings.clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        lock(&self.state).downloads.clone()
    }

    /// Listings plus downloads.
    pub fn provider_calls(&self) -> usize {
        let state = lock(&self.state);
        state.listings.len() + state.downloads.len()
    }
}

#[async_trait]
impl CloudStorageConnector for MockCloudStorageClient {
    async fn connect(&self, auth: &CloudAuth) -> ProviderResult<Arc<dyn CloudStorageClient>> {
        lock(&self.state).auths.push(auth.clone());
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl CloudStorageClient for MockCloudStorageClient {
    async fn list_folder_items(&self, folder_id: &str, offset: u64) -> ProviderResult<BoxFolderItems> {
        let mut state = lock(&self.state);
        state.listings.push((folder_id.to_string(), offset));
        if state.reject_token {
            return Err(ProviderError::Api {
                status: 401,
                message: "invalid_token".into(),
            });
        }
        let (subfolders, files) = state
            .folders
            .get(folder_id)
            .cloned()
            .ok_or_else(|| not_found(folder_id))?;

        let mut entries: Vec<BoxItem> = subfolders
            .into_iter()
            .map(|id| BoxItem {
                item_type: BoxItemType::Folder,
                name: id.clone(),
                id,
                size: None,
                modified_at: None,
                content_modified_at: None,
            })
            .collect();
        for name in files {
            let id = Self::file_id(folder_id, &name);
            let size = state.contents.get(&id).map(|b| b.len() as u64);
            entries.push(BoxItem {
                item_type: BoxItemType::File,
                id,
                name,
                size,
                modified_at: None,
                content_modified_at: None,
            });
        }

        let total = entries.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(total);
        let end = state
            .page_size
            .map_or(total, |size| start.saturating_add(size).min(total));
        Ok(BoxFolderItems {
            entries: entries[start..end].to_vec(),
            total_count: total as u64,
            offset,
            limit: (end - start) as u64,
        })
    }

    async fn download_file(&self, file_id: &str) -> ProviderResult<ByteStream> {
        let mut state = lock(&self.state);
        state.downloads.push(file_id.to_string());
        let bytes = state
            .contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| not_found(file_id))?;
        Ok(single_chunk(bytes))
    }
}

// ============================================================================
// Generic API
// ============================================================================

#[derive(Default)]
struct ApiState {
    items: Vec<ApiItem>,
    failure: Option<ProviderError>,
    opened: Vec<ApiCrawlerConfig>,
}

/// Yields canned items regardless of the endpoint configuration.
#[derive(Clone, Default)]
pub struct MockApiSource {
    state: Arc<Mutex<ApiState>>,
    pulled: Arc<AtomicUsize>,
}

impl MockApiSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(self, item: ApiItem) -> Self {
        lock(&self.state).items.push(item);
        self
    }

    /// The next opened stream yields this error first.
    pub fn failing_with(self, err: ProviderError) -> Self {
        lock(&self.state).failure = Some(err);
        self
    }

    pub fn opened(&self) -> Vec<ApiCrawlerConfig> {
        lock(&self.state).opened.clone()
    }

    /// Items handed out so far across all streams.
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

impl ApiSource for MockApiSource {
    fn open(&self, config: ApiCrawlerConfig, _auth: ApiAuth) -> ProviderResult<ApiItemStream> {
        let mut state = lock(&self.state);
        state.opened.push(config);
        if let Some(err) = state.failure.take() {
            return Ok(stream::once(async move { Err(err) }).boxed());
        }
        let pulled = Arc::clone(&self.pulled);
        let items = state.items.clone();
        Ok(stream::iter(items)
            .map(move |item| {
                pulled.fetch_add(1, Ordering::SeqCst);
                Ok(item)
            })
            .boxed())
    }
}
