//! Paginated fetching of raw items.

use futures::stream::{BoxStream, StreamExt};
use secrecy::{ExposeSecret, SecretBox};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{ApiCrawlerConfig, ApiProvider, AuthType, HttpMethod, PaginationConfig};
use crate::error::{ApiCrawlerError, Result};
use crate::json_path::{extract_json_path, value_to_string};
use crate::mapping::{map_item, ApiItem};
use crate::providers::shopware6;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type Secret = Arc<SecretBox<str>>;

fn secret(value: String) -> Secret {
    Arc::new(SecretBox::new(value.into_boxed_str()))
}

/// Authentication material resolved from the crawler's stored credentials.
#[derive(Clone, Default)]
pub enum ApiAuth {
    #[default]
    None,
    Bearer(Secret),
    Basic {
        username: String,
        password: Secret,
    },
    Header {
        name: String,
        value: Secret,
    },
}

impl ApiAuth {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(secret(token.into()))
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: secret(password.into()),
        }
    }

    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Header {
            name: name.into(),
            value: secret(value.into()),
        }
    }

    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            ApiAuth::None => request,
            ApiAuth::Bearer(token) => request.bearer_auth(token.expose_secret()),
            ApiAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password.expose_secret()))
            }
            ApiAuth::Header { name, value } => request.header(name.as_str(), value.expose_secret()),
        }
    }
}

impl std::fmt::Debug for ApiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ApiAuth::None => "None",
            ApiAuth::Bearer(_) => "Bearer([REDACTED])",
            ApiAuth::Basic { .. } => "Basic([REDACTED])",
            ApiAuth::Header { .. } => "Header([REDACTED])",
        };
        f.write_str(kind)
    }
}

/// Position within a paginated listing.
#[derive(Debug, Clone, PartialEq)]
enum PageCursor {
    Page(u32),
    Offset(u64),
    Cursor(Option<String>),
    Single,
}

#[derive(Clone)]
pub struct ApiCrawlerClient {
    client: reqwest::Client,
    config: Arc<ApiCrawlerConfig>,
    auth: ApiAuth,
}

impl ApiCrawlerClient {
    /// Provider presets are applied before validation.
    pub fn new(config: ApiCrawlerConfig, auth: ApiAuth) -> Result<Self> {
        let config = config.apply_preset();
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ApiCrawlerError::Http)?;
        Ok(Self {
            client,
            config: Arc::new(config),
            auth,
        })
    }

    pub fn config(&self) -> &ApiCrawlerConfig {
        &self.config
    }

    /// Which auth the config asks for. Callers resolve it against stored credentials.
    pub fn auth_type(&self) -> AuthType {
        self.config.auth_type
    }

    /// Lazily page through the endpoint, yielding mapped items.
    ///
    /// No request is made until the stream is polled, and the next page is
    /// only requested once every item of the current one has been consumed.
    pub fn stream_items(&self) -> BoxStream<'static, Result<ApiItem>> {
        let this = self.clone();
        async_stream::try_stream! {
            let mut cursor = this.first_cursor();
            let mut page_number = 0u32;
            loop {
                page_number += 1;
                let response = this.fetch_page(&cursor).await?;
                let items = this.extract_items(&response)?;
                let count = items.len();
                info!(page = page_number, items = count, "Fetched API page");

                let next = this.next_cursor(&cursor, &response, count);

                for raw in items {
                    yield map_item(raw, &this.config);
                }

                match next {
                    Some(next) => cursor = next,
                    None => break,
                }

                if let Some(delay) = this.config.request_delay_ms.filter(|ms| *ms > 0) {
                    debug!(delay_ms = delay, "Delaying before next API request");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
        .boxed()
    }

    fn first_cursor(&self) -> PageCursor {
        match &self.config.pagination {
            PaginationConfig::None => PageCursor::Single,
            PaginationConfig::Page { .. } => PageCursor::Page(1),
            PaginationConfig::Offset { .. } => PageCursor::Offset(0),
            PaginationConfig::Cursor { .. } => PageCursor::Cursor(None),
        }
    }

    /// `None` when the listing is exhausted.
    fn next_cursor(&self, current: &PageCursor, response: &Value, count: usize) -> Option<PageCursor> {
        if count == 0 {
            return None;
        }
        match (&self.config.pagination, current) {
            (PaginationConfig::Page { page_size, .. }, PageCursor::Page(page)) => {
                (count >= *page_size as usize).then(|| PageCursor::Page(page + 1))
            }
            (PaginationConfig::Offset { limit, .. }, PageCursor::Offset(offset)) => {
                (count >= *limit as usize).then(|| PageCursor::Offset(offset + count as u64))
            }
            (PaginationConfig::Cursor { cursor_path, .. }, PageCursor::Cursor(previous)) => {
                let next = extract_json_path(response, cursor_path)
                    .filter(|v| !v.is_null())
                    .map(value_to_string)
                    .filter(|s| !s.is_empty())?;
                // A repeated cursor would loop forever
                (previous.as_deref() != Some(next.as_str()))
                    .then(|| PageCursor::Cursor(Some(next)))
            }
            _ => None,
        }
    }

    fn page_params(&self, cursor: &PageCursor) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .config
            .query_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match (&self.config.pagination, cursor) {
            (
                PaginationConfig::Page {
                    page_param,
                    page_size_param,
                    page_size,
                },
                PageCursor::Page(page),
            ) => {
                params.push((page_param.clone(), page.to_string()));
                params.push((page_size_param.clone(), page_size.to_string()));
            }
            (
                PaginationConfig::Offset {
                    offset_param,
                    limit_param,
                    limit,
                },
                PageCursor::Offset(offset),
            ) => {
                params.push((offset_param.clone(), offset.to_string()));
                params.push((limit_param.clone(), limit.to_string()));
            }
            (
                PaginationConfig::Cursor {
                    cursor_param,
                    limit_param,
                    limit,
                    ..
                },
                PageCursor::Cursor(value),
            ) => {
                if let Some(value) = value {
                    params.push((cursor_param.clone(), value.clone()));
                }
                if let (Some(param), Some(limit)) = (limit_param, limit) {
                    params.push((param.clone(), limit.to_string()));
                }
            }
            _ => {}
        }
        params
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> Result<Value> {
        let url = self.config.endpoint_url();
        let params = self.page_params(cursor);
        debug!(url = %url, ?cursor, "Requesting API page");

        let mut request = match self.config.method {
            HttpMethod::Get => self.client.get(&url).query(&params),
            HttpMethod::Post => self.client.post(&url).json(&self.post_body(cursor, &params)),
        };
        request = request.header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = self.auth.apply(request);

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiCrawlerError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json().await?)
    }

    fn post_body(&self, cursor: &PageCursor, params: &[(String, String)]) -> Value {
        match (self.config.provider, cursor) {
            (ApiProvider::Shopware6, PageCursor::Page(page)) => {
                shopware6::request_body(*page, &self.config.associations)
            }
            _ => Value::Object(
                params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }

    fn extract_items(&self, response: &Value) -> Result<Vec<Value>> {
        let path = self.config.data_path.as_deref().unwrap_or("");
        match extract_json_path(response, path) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(Value::Null) | None if !path.is_empty() => Ok(Vec::new()),
            Some(other) if path.is_empty() && other.is_object() => Ok(vec![other.clone()]),
            _ => Err(ApiCrawlerError::Shape(format!(
                "no item array at path '{}'",
                path
            ))),
        }
    }
}
