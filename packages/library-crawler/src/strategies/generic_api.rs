//! Paginated JSON APIs, one synthesized markdown document per item.

use api_crawler::{ApiAuth, ApiCrawlerClient, ApiCrawlerConfig, ApiItem, AuthType};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{info, warn};

use super::{CrawlStrategy, DiscoveredItem, Discovery, DiscoveryFailure, FetchHandle};
use crate::credentials::{keys, Credentials};
use crate::error::{CrawlError, CrawlResult, ProviderError, ProviderResult};
use crate::model::{DiscoveredFile, SourceDescriptor, SourceKind};

pub const API_MIME_TYPE: &str = "text/markdown";
const MAX_FILE_STEM: usize = 50;

pub type ApiItemStream = BoxStream<'static, ProviderResult<ApiItem>>;

/// Opens a lazy item stream for an endpoint configuration.
pub trait ApiSource: Send + Sync {
    fn open(&self, config: ApiCrawlerConfig, auth: ApiAuth) -> ProviderResult<ApiItemStream>;
}

/// [`ApiSource`] backed by [`ApiCrawlerClient`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpApiSource;

impl ApiSource for HttpApiSource {
    fn open(&self, config: ApiCrawlerConfig, auth: ApiAuth) -> ProviderResult<ApiItemStream> {
        let client = ApiCrawlerClient::new(config, auth)?;
        Ok(client
            .stream_items()
            .map(|item| item.map_err(ProviderError::from))
            .boxed())
    }
}

/// Parse `providerConfig`, apply any provider preset and validate.
/// Failures are descriptor errors.
pub fn parse_config(descriptor: &SourceDescriptor) -> CrawlResult<ApiCrawlerConfig> {
    let raw = descriptor
        .provider_config
        .clone()
        .ok_or_else(|| CrawlError::invalid("missing providerConfig for API crawler"))?;
    let config = serde_json::from_value::<ApiCrawlerConfig>(raw)
        .map_err(|e| CrawlError::invalid(format!("invalid API crawler config: {}", e)))?
        .apply_preset();
    config
        .validate()
        .map_err(|e| CrawlError::invalid(format!("invalid API crawler config: {}", e)))?;
    Ok(config)
}

fn missing(keys: &[&str]) -> CrawlError {
    CrawlError::MissingCredentials {
        kind: SourceKind::GenericApi,
        missing: keys.join(", "),
    }
}

/// Resolve the configured auth type against stored credentials.
pub fn resolve_auth(config: &ApiCrawlerConfig, credentials: &Credentials) -> CrawlResult<ApiAuth> {
    match config.auth_type {
        AuthType::None => Ok(ApiAuth::None),
        AuthType::Bearer => credentials
            .value(keys::API_TOKEN)
            .map(ApiAuth::bearer)
            .ok_or_else(|| missing(&[keys::API_TOKEN])),
        AuthType::Basic => match (
            credentials.value(keys::USERNAME),
            credentials.value(keys::PASSWORD),
        ) {
            (Some(username), Some(password)) => Ok(ApiAuth::basic(username, password)),
            _ => Err(missing(&[keys::USERNAME, keys::PASSWORD])),
        },
        AuthType::ApiKey => credentials
            .value(keys::API_KEY)
            .map(|key| ApiAuth::header(config.api_key_header.as_str(), key))
            .ok_or_else(|| missing(&[keys::API_KEY])),
    }
}

fn fold_char(c: char) -> Option<&'static str> {
    Some(match c {
        'ä' | 'æ' => "ae",
        'ö' | 'œ' => "oe",
        'ü' => "ue",
        'ß' => "ss",
        'à' | 'á' | 'â' | 'ã' | 'å' | 'ā' | 'ą' => "a",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ø' => "o",
        'ř' => "r",
        'ś' | 'š' => "s",
        'ť' => "t",
        'ù' | 'ú' | 'û' | 'ů' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    })
}

/// Deterministic `.md` file name for an item title.
///
/// `"Über uns: Öffnungszeiten!"` -> `"ueber_uns_oeffnungszeiten.md"`. Falls
/// back to `api_item_<n>.md` when nothing usable remains.
pub fn file_name_for_title(title: &str, item_number: usize) -> String {
    fn push(s: &str, stem: &mut String) {
        for c in s.chars() {
            if c.is_ascii_alphanumeric() {
                stem.push(c);
            } else if !stem.is_empty() && !stem.ends_with('_') {
                stem.push('_');
            }
        }
    }

    let mut stem = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        match fold_char(c) {
            Some(folded) => push(folded, &mut stem),
            None => {
                let mut buf = [0u8; 4];
                push(c.encode_utf8(&mut buf), &mut stem);
            }
        }
    }

    let stem: String = stem.chars().take(MAX_FILE_STEM).collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        format!("api_item_{}.md", item_number)
    } else {
        format!("{}.md", stem)
    }
}

fn document_item(item: ApiItem, item_number: usize) -> Result<DiscoveredItem, DiscoveryFailure> {
    let name = file_name_for_title(&item.title, item_number);
    let Some(origin_uri) = item.origin_uri else {
        return Err(DiscoveryFailure::new(format!(
            "API item \"{}\" has no identifying field (url, id, sku, title)",
            item.title
        ))
        .named(name));
    };

    let content = if item.content.trim().is_empty() {
        format!("# {}\n\nNo content available", item.title)
    } else {
        item.content
    };

    let file = DiscoveredFile::new(origin_uri.clone(), name, origin_uri)
        .with_size(content.len() as u64)
        .with_mime_type(API_MIME_TYPE);
    Ok(DiscoveredItem::new(file, FetchHandle::ready(Bytes::from(content))))
}

fn fatal(err: ProviderError) -> CrawlError {
    if err.is_auth() {
        CrawlError::Authentication(err)
    } else {
        CrawlError::Connect(err)
    }
}

/// Strategy for [`SourceKind::GenericApi`].
#[derive(Clone)]
pub struct GenericApiStrategy {
    source: Arc<dyn ApiSource>,
}

impl Default for GenericApiStrategy {
    fn default() -> Self {
        Self::new(HttpApiSource)
    }
}

impl GenericApiStrategy {
    pub fn new(source: impl ApiSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

#[async_trait]
impl CrawlStrategy for GenericApiStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::GenericApi
    }

    fn label(&self) -> &'static str {
        "API"
    }

    /// Items are synthesized documents, not files, so file filters do not apply.
    fn applies_filters(&self) -> bool {
        false
    }

    async fn discover(
        &self,
        descriptor: &SourceDescriptor,
        credentials: &Credentials,
    ) -> CrawlResult<Discovery> {
        let config = parse_config(descriptor)?;
        let auth = resolve_auth(&config, credentials)?;
        info!(endpoint = %config.endpoint_url(), auth = ?auth, "Starting API crawl");

        let mut items = self.source.open(config, auth).map_err(|e| match e {
            ProviderError::Parse(msg) => CrawlError::invalid(msg),
            other => fatal(other),
        })?;

        // The first page doubles as the connection check.
        let first = match items.next().await {
            None => return Ok(Discovery::empty()),
            Some(Err(e)) => return Err(fatal(e)),
            Some(Ok(item)) => item,
        };

        let documents = stream::once(async move { Ok(first) })
            .chain(items)
            .enumerate()
            .map(|(index, item)| match item {
                Ok(item) => document_item(item, index + 1),
                Err(e) => {
                    warn!(error = %e, "API page request failed");
                    Err(DiscoveryFailure::from(e))
                }
            })
            .boxed();

        Ok(Discovery::new(documents))
    }
}
