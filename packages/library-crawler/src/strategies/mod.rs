//! Provider crawl strategies.
//!
//! Each strategy turns a [`SourceDescriptor`] into a lazy [`Discovery`]: a
//! stream of discovered files, each paired with a deferred [`FetchHandle`].
//! Nothing is downloaded until the orchestrator calls [`FetchHandle::fetch`].
//!
//! - [`web::WebStrategy`]: same-host HTML traversal
//! - [`remote_share::RemoteShareStrategy`]: SMB shares via the crawling service
//! - [`cloud_storage::CloudStorageStrategy`]: Box folders, breadth-first
//! - [`generic_api::GenericApiStrategy`]: paginated JSON endpoints

pub mod cloud_storage;
pub mod generic_api;
pub mod remote_share;
pub mod web;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::credentials::Credentials;
use crate::error::{CrawlResult, ProviderError, ProviderResult};
use crate::model::{DiscoveredFile, SourceDescriptor, SourceKind};

pub use cloud_storage::{
    BoxConnector, CloudAuth, CloudStorageClient, CloudStorageConnector, CloudStorageStrategy,
};
pub use generic_api::{ApiSource, GenericApiStrategy, HttpApiSource};
pub use remote_share::{RemoteShareClient, RemoteShareStrategy};
pub use web::{HtmlClient, HttpHtmlClient, WebPage, WebStrategy};

/// File bytes as they arrive from a provider.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

/// Deferred byte retrieval for one discovered file.
pub struct FetchHandle(BoxFuture<'static, ProviderResult<ByteStream>>);

impl FetchHandle {
    pub fn new<F>(fetch: F) -> Self
    where
        F: Future<Output = ProviderResult<ByteStream>> + Send + 'static,
    {
        Self(fetch.boxed())
    }

    /// Content already in hand (rendered pages, synthesized documents).
    pub fn ready(bytes: Bytes) -> Self {
        Self::new(async move {
            Ok(stream::once(async move { Ok(bytes) }).boxed())
        })
    }

    pub async fn fetch(self) -> ProviderResult<ByteStream> {
        self.0.await
    }
}

impl fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FetchHandle")
    }
}

#[derive(Debug)]
pub struct DiscoveredItem {
    pub file: DiscoveredFile,
    pub fetch: FetchHandle,
}

impl DiscoveredItem {
    pub fn new(file: DiscoveredFile, fetch: FetchHandle) -> Self {
        Self { file, fetch }
    }
}

/// A discovery step that failed without ending the crawl, e.g. one folder
/// listing or one page. Surfaces as an `error` outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryFailure {
    pub message: String,
    pub name: Option<String>,
    pub origin_uri: Option<String>,
}

impl DiscoveryFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
            origin_uri: None,
        }
    }

    pub fn at(mut self, origin_uri: impl Into<String>) -> Self {
        self.origin_uri = Some(origin_uri.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl From<ProviderError> for DiscoveryFailure {
    fn from(err: ProviderError) -> Self {
        Self::new(err.to_string())
    }
}

type CancelAction = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Remote cancellation for discoveries that run in an external process.
///
/// Fires once: on [`Discovery::stop`], or when dropped while still armed.
/// A strategy disarms it through [`CancelGuard::finished_flag`] once the
/// remote side reports completion.
pub struct CancelGuard {
    finished: Arc<AtomicBool>,
    action: Option<CancelAction>,
}

impl CancelGuard {
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            finished: Arc::new(AtomicBool::new(false)),
            action: Some(Box::new(move || action().boxed())),
        }
    }

    /// Shared flag; set it to `true` when no cancel call is needed anymore.
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }

    fn take_pending(&mut self) -> Option<CancelAction> {
        if self.finished.load(Ordering::SeqCst) {
            self.action = None;
        }
        self.action.take()
    }

    pub async fn cancel(mut self) {
        if let Some(action) = self.take_pending() {
            action().await;
        }
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let Some(action) = self.take_pending() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Discovery dropped early, cancelling remote job");
                handle.spawn(action());
            }
            Err(_) => warn!("Discovery dropped outside a runtime, remote job not cancelled"),
        }
    }
}

/// Lazy stream of discovered items for one crawl.
pub struct Discovery {
    items: BoxStream<'static, Result<DiscoveredItem, DiscoveryFailure>>,
    cancel: Option<CancelGuard>,
}

impl Discovery {
    pub fn new(items: BoxStream<'static, Result<DiscoveredItem, DiscoveryFailure>>) -> Self {
        Self {
            items,
            cancel: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(stream::empty().boxed())
    }

    pub fn with_cancel(mut self, guard: CancelGuard) -> Self {
        self.cancel = Some(guard);
        self
    }

    pub async fn next(&mut self) -> Option<Result<DiscoveredItem, DiscoveryFailure>> {
        self.items.next().await
    }

    /// Stop pulling and cancel any remote work still running.
    pub async fn stop(self) {
        let Discovery { items, cancel } = self;
        drop(items);
        if let Some(guard) = cancel {
            guard.cancel().await;
        }
    }
}

/// One way of discovering files for a source kind.
#[async_trait]
pub trait CrawlStrategy: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Short provider name used in outcome hints.
    fn label(&self) -> &'static str;

    /// Whether the orchestrator runs the file filter on this strategy's items.
    fn applies_filters(&self) -> bool {
        true
    }

    /// Start discovery. Errors here are fatal for the crawl.
    async fn discover(
        &self,
        descriptor: &SourceDescriptor,
        credentials: &Credentials,
    ) -> CrawlResult<Discovery>;
}

/// Strategies keyed by the source kind they handle.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<SourceKind, Arc<dyn CrawlStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: impl CrawlStrategy + 'static) -> Self {
        self.register(Arc::new(strategy));
        self
    }

    pub fn register(&mut self, strategy: Arc<dyn CrawlStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn CrawlStrategy>> {
        self.strategies.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.strategies.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_guard(count: Arc<AtomicUsize>) -> CancelGuard {
        CancelGuard::new(move || async move {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_fetch_handle_is_lazy() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let handle = FetchHandle::new(async move {
            flag.store(true, Ordering::SeqCst);
            Ok(stream::empty().boxed())
        });
        assert!(!called.load(Ordering::SeqCst));
        handle.fetch().await.unwrap();
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_cancels_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let discovery = Discovery::empty().with_cancel(counting_guard(count.clone()));
        discovery.stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finished_guard_does_not_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let guard = counting_guard(count.clone());
        guard.finished_flag().store(true, Ordering::SeqCst);
        Discovery::empty().with_cancel(guard).stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_cancels_in_background() {
        let count = Arc::new(AtomicUsize::new(0));
        drop(Discovery::empty().with_cancel(counting_guard(count.clone())));
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if count.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
