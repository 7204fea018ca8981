//! Box folders, listed breadth-first.
//!
//! Files of a folder are yielded before any of its subfolders are listed.
//! Listing pages are requested lazily, so a crawl cut short by `maxPages`
//! makes no further provider calls.

use async_stream::stream;
use async_trait::async_trait;
use box_client::{BoxClient, BoxFolderItems, BoxItem, BoxItemType};
use futures::StreamExt;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ByteStream, CrawlStrategy, DiscoveredItem, Discovery, DiscoveryFailure, FetchHandle};
use crate::credentials::{keys, Credentials, SecretString};
use crate::error::{CrawlError, CrawlResult, ProviderError, ProviderResult};
use crate::model::{DiscoveredFile, SourceDescriptor, SourceKind};

pub const ROOT_FOLDER_ID: &str = "0";

/// Folder listing and download, authenticated.
#[async_trait]
pub trait CloudStorageClient: Send + Sync {
    async fn list_folder_items(&self, folder_id: &str, offset: u64) -> ProviderResult<BoxFolderItems>;

    async fn download_file(&self, file_id: &str) -> ProviderResult<ByteStream>;
}

#[async_trait]
impl CloudStorageClient for BoxClient {
    async fn list_folder_items(&self, folder_id: &str, offset: u64) -> ProviderResult<BoxFolderItems> {
        Ok(BoxClient::list_folder_items(self, folder_id, offset).await?)
    }

    async fn download_file(&self, file_id: &str) -> ProviderResult<ByteStream> {
        let bytes = BoxClient::download_file(self, file_id).await?;
        Ok(bytes.map(|chunk| chunk.map_err(ProviderError::from)).boxed())
    }
}

/// How a crawl authenticates against the storage API.
#[derive(Debug, Clone, PartialEq)]
pub enum CloudAuth {
    /// Ready-made access token
    Token(SecretString),
    /// OAuth2 client-credentials grant
    ClientCredentials {
        client_id: String,
        client_secret: SecretString,
        enterprise_id: Option<String>,
    },
}

impl CloudAuth {
    /// A stored `boxToken` wins over client credentials.
    pub fn from_credentials(credentials: &Credentials) -> CrawlResult<Self> {
        if let Some(token) = credentials.value(keys::BOX_TOKEN) {
            return Ok(CloudAuth::Token(SecretString::new(token)));
        }
        match (
            credentials.value(keys::BOX_CLIENT_ID),
            credentials.value(keys::BOX_CLIENT_SECRET),
        ) {
            (Some(client_id), Some(client_secret)) => Ok(CloudAuth::ClientCredentials {
                client_id: client_id.to_string(),
                client_secret: SecretString::new(client_secret),
                enterprise_id: credentials.value(keys::BOX_ENTERPRISE_ID).map(String::from),
            }),
            _ => Err(CrawlError::MissingCredentials {
                kind: SourceKind::CloudStorage,
                missing: format!(
                    "{} or {} and {}",
                    keys::BOX_TOKEN,
                    keys::BOX_CLIENT_ID,
                    keys::BOX_CLIENT_SECRET
                ),
            }),
        }
    }
}

/// Builds an authenticated client once per crawl.
#[async_trait]
pub trait CloudStorageConnector: Send + Sync {
    async fn connect(&self, auth: &CloudAuth) -> ProviderResult<Arc<dyn CloudStorageClient>>;
}

/// Connects to the Box API.
#[derive(Debug, Clone, Default)]
pub struct BoxConnector {
    base_url: Option<String>,
}

impl BoxConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

#[async_trait]
impl CloudStorageConnector for BoxConnector {
    async fn connect(&self, auth: &CloudAuth) -> ProviderResult<Arc<dyn CloudStorageClient>> {
        let client = match auth {
            CloudAuth::Token(token) => BoxClient::new(token.expose().to_string()),
            CloudAuth::ClientCredentials {
                client_id,
                client_secret,
                enterprise_id,
            } => {
                BoxClient::authenticate(client_id, client_secret.expose(), enterprise_id.as_deref())
                    .await?
            }
        };
        let client = match &self.base_url {
            Some(url) => client.with_base_url(url.as_str()),
            None => client,
        };
        Ok(Arc::new(client))
    }
}

/// Folder id from `box://<id>` or `https://app.box.com/folder/<id>`; anything else is the root.
pub fn parse_folder_id(uri: &str) -> String {
    let uri = uri.trim();
    if let Some(rest) = uri.strip_prefix("box://") {
        let id = rest.trim_matches('/');
        return if id.is_empty() {
            ROOT_FOLDER_ID.to_string()
        } else {
            id.to_string()
        };
    }
    if let Some(idx) = uri.find("/folder/") {
        let digits: String = uri[idx + "/folder/".len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if !digits.is_empty() {
            return digits;
        }
    }
    ROOT_FOLDER_ID.to_string()
}

pub fn file_origin_uri(file_id: &str) -> String {
    format!("https://app.box.com/file/{}", file_id)
}

fn folder_uri(folder_id: &str) -> String {
    format!("https://app.box.com/folder/{}", folder_id)
}

fn fatal(err: ProviderError) -> CrawlError {
    if err.is_auth() {
        CrawlError::Authentication(err)
    } else {
        CrawlError::Connect(err)
    }
}

struct Folder {
    id: String,
    path: String,
    depth: u32,
}

fn file_item(item: BoxItem, parent_path: &str, client: &Arc<dyn CloudStorageClient>) -> DiscoveredItem {
    let relative_path = if parent_path.is_empty() {
        item.name.clone()
    } else {
        format!("{}/{}", parent_path, item.name)
    };
    let modified = item.last_modified();
    let mut file = DiscoveredFile::new(item.id.clone(), item.name, file_origin_uri(&item.id))
        .with_relative_path(relative_path);
    if let Some(size) = item.size {
        file = file.with_size(size);
    }
    if let Some(modified) = modified {
        file = file.with_last_modified(modified);
    }

    let client = Arc::clone(client);
    let file_id = item.id;
    DiscoveredItem::new(
        file,
        FetchHandle::new(async move { client.download_file(&file_id).await }),
    )
}

/// Strategy for [`SourceKind::CloudStorage`].
#[derive(Clone)]
pub struct CloudStorageStrategy {
    connector: Arc<dyn CloudStorageConnector>,
}

impl CloudStorageStrategy {
    pub fn new(connector: impl CloudStorageConnector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    pub fn for_box() -> Self {
        Self::new(BoxConnector::new())
    }
}

#[async_trait]
impl CrawlStrategy for CloudStorageStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::CloudStorage
    }

    fn label(&self) -> &'static str {
        "Box"
    }

    async fn discover(
        &self,
        descriptor: &SourceDescriptor,
        credentials: &Credentials,
    ) -> CrawlResult<Discovery> {
        let auth = CloudAuth::from_credentials(credentials)?;
        let client = self.connector.connect(&auth).await.map_err(fatal)?;

        let root_id = parse_folder_id(&descriptor.uri);
        info!(folder_id = %root_id, max_depth = descriptor.max_depth, "Starting Box crawl");

        // The first listing doubles as the connection check.
        let first_page = client.list_folder_items(&root_id, 0).await.map_err(fatal)?;
        let max_depth = descriptor.max_depth;

        let items = stream! {
            let mut seen: HashSet<String> = HashSet::from([root_id.clone()]);
            let mut queue: VecDeque<Folder> = VecDeque::from([Folder {
                id: root_id,
                path: String::new(),
                depth: 0,
            }]);
            let mut prefetched = Some(first_page);

            while let Some(folder) = queue.pop_front() {
                debug!(folder_id = %folder.id, depth = folder.depth, "Listing Box folder");
                let mut subfolders = Vec::new();
                let mut offset = 0u64;
                loop {
                    let page = match prefetched.take() {
                        Some(page) => page,
                        None => match client.list_folder_items(&folder.id, offset).await {
                            Ok(page) => page,
                            Err(e) => {
                                warn!(folder_id = %folder.id, error = %e, "Box folder listing failed");
                                yield Err(DiscoveryFailure::from(e).at(folder_uri(&folder.id)));
                                break;
                            }
                        },
                    };

                    let count = page.entries.len() as u64;
                    let total = page.total_count;
                    for item in page.entries {
                        match item.item_type {
                            BoxItemType::File => {
                                yield Ok(file_item(item, &folder.path, &client));
                            }
                            BoxItemType::Folder if folder.depth < max_depth => {
                                if seen.insert(item.id.clone()) {
                                    let path = if folder.path.is_empty() {
                                        item.name.clone()
                                    } else {
                                        format!("{}/{}", folder.path, item.name)
                                    };
                                    subfolders.push(Folder {
                                        id: item.id,
                                        path,
                                        depth: folder.depth + 1,
                                    });
                                }
                            }
                            _ => {}
                        }
                    }

                    offset += count;
                    if count == 0 || offset >= total {
                        break;
                    }
                }
                queue.extend(subfolders);
            }
        };

        Ok(Discovery::new(items.boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CrawlerId, LibraryId};
    use crate::testing::MockCloudStorageClient;

    fn descriptor(uri: &str) -> SourceDescriptor {
        SourceDescriptor::new(CrawlerId::new(), LibraryId::new(), SourceKind::CloudStorage, uri)
    }

    fn token() -> Credentials {
        Credentials::new().with(keys::BOX_TOKEN, "t0ken")
    }

    async fn paths(mut discovery: Discovery) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = discovery.next().await {
            out.push(item.unwrap().file.relative_path);
        }
        out
    }

    #[test]
    fn test_folder_id_parsing() {
        assert_eq!(parse_folder_id("box://123"), "123");
        assert_eq!(parse_folder_id("box://"), "0");
        assert_eq!(parse_folder_id("https://app.box.com/folder/98765?s=x"), "98765");
        assert_eq!(parse_folder_id("https://example.com/anything"), "0");
    }

    #[test]
    fn test_auth_resolution() {
        assert!(matches!(
            CloudAuth::from_credentials(&token()).unwrap(),
            CloudAuth::Token(_)
        ));
        let creds = Credentials::new()
            .with(keys::BOX_CLIENT_ID, "id")
            .with(keys::BOX_CLIENT_SECRET, "secret")
            .with(keys::BOX_ENTERPRISE_ID, "42");
        match CloudAuth::from_credentials(&creds).unwrap() {
            CloudAuth::ClientCredentials { enterprise_id, .. } => {
                assert_eq!(enterprise_id.as_deref(), Some("42"))
            }
            other => panic!("unexpected auth {:?}", other),
        }
        assert!(matches!(
            CloudAuth::from_credentials(&Credentials::new()),
            Err(CrawlError::MissingCredentials { .. })
        ));
    }

    #[tokio::test]
    async fn test_files_before_subfolders_breadth_first() {
        let client = MockCloudStorageClient::new()
            .with_folder("0", &["sub1", "sub2"], &["root.txt"])
            .with_folder("sub1", &["deep"], &["one.txt"])
            .with_folder("sub2", &[], &["two.txt"])
            .with_folder("deep", &[], &["deep.txt"]);

        let strategy = CloudStorageStrategy::new(client.clone());
        let discovery = strategy
            .discover(&descriptor("box://0").with_max_depth(2), &token())
            .await
            .unwrap();

        assert_eq!(
            paths(discovery).await,
            vec!["root.txt", "sub1/one.txt", "sub2/two.txt", "sub1/deep/deep.txt"]
        );
    }

    #[tokio::test]
    async fn test_depth_bound_and_cycle_guard() {
        let client = MockCloudStorageClient::new()
            .with_folder("0", &["a"], &["root.txt"])
            .with_folder("a", &["0"], &["a.txt"]);

        let strategy = CloudStorageStrategy::new(client.clone());
        let discovery = strategy
            .discover(&descriptor("box://0").with_max_depth(5), &token())
            .await
            .unwrap();
        assert_eq!(paths(discovery).await, vec!["root.txt", "a/a.txt"]);

        let discovery = strategy
            .discover(&descriptor("box://0").with_max_depth(0), &token())
            .await
            .unwrap();
        assert_eq!(paths(discovery).await, vec!["root.txt"]);
    }

    #[tokio::test]
    async fn test_rejected_token_is_fatal() {
        let client = MockCloudStorageClient::new()
            .with_folder("0", &[], &["root.txt"])
            .rejecting_token();
        let result = CloudStorageStrategy::new(client)
            .discover(&descriptor("box://0"), &token())
            .await;
        assert!(matches!(result, Err(CrawlError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_failed_subfolder_listing_is_a_failure_item() {
        let client = MockCloudStorageClient::new()
            .with_folder("0", &["gone"], &["root.txt"]);
        let mut discovery = CloudStorageStrategy::new(client)
            .discover(&descriptor("box://0"), &token())
            .await
            .unwrap();

        assert!(discovery.next().await.unwrap().is_ok());
        let failure = discovery.next().await.unwrap().unwrap_err();
        assert_eq!(failure.origin_uri.as_deref(), Some("https://app.box.com/folder/gone"));
        assert!(discovery.next().await.is_none());
    }
}
