//! Crawler configuration, deserialised from the crawler's stored JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ApiCrawlerError, Result};

fn default_page_param() -> String {
    "page".into()
}

fn default_page_size_param() -> String {
    "pageSize".into()
}

fn default_offset_param() -> String {
    "offset".into()
}

fn default_limit_param() -> String {
    "limit".into()
}

fn default_cursor_param() -> String {
    "cursor".into()
}

fn default_page_size() -> u32 {
    50
}

fn default_api_key_header() -> String {
    "X-API-Key".into()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PaginationConfig {
    /// Single request, no paging.
    #[default]
    None,
    /// `?page=1&pageSize=50`, stops on an empty or short page.
    #[serde(rename_all = "camelCase")]
    Page {
        #[serde(default = "default_page_param")]
        page_param: String,
        #[serde(default = "default_page_size_param")]
        page_size_param: String,
        #[serde(default = "default_page_size")]
        page_size: u32,
    },
    /// `?offset=0&limit=50`, stops on an empty or short page.
    #[serde(rename_all = "camelCase")]
    Offset {
        #[serde(default = "default_offset_param")]
        offset_param: String,
        #[serde(default = "default_limit_param")]
        limit_param: String,
        #[serde(default = "default_page_size")]
        limit: u32,
    },
    /// Next cursor read from `cursorPath` in each response; stops when absent.
    #[serde(rename_all = "camelCase")]
    Cursor {
        #[serde(default = "default_cursor_param")]
        cursor_param: String,
        cursor_path: String,
        #[serde(default)]
        limit_param: Option<String>,
        #[serde(default)]
        limit: Option<u32>,
    },
}

/// Known API shapes. `Custom` uses the configured request and field mapping as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiProvider {
    #[default]
    Custom,
    /// Shopware 6 Admin API, paged through the search endpoints.
    Shopware6,
    /// Weclapp ERP REST API.
    Weclapp,
}

impl ApiProvider {
    /// Endpoint used when the config leaves it empty.
    pub fn default_endpoint(self) -> Option<&'static str> {
        match self {
            ApiProvider::Custom => None,
            ApiProvider::Shopware6 => Some("/api/product"),
            ApiProvider::Weclapp => Some("/webapp/api/v1/article"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthType {
    #[default]
    None,
    Bearer,
    Basic,
    ApiKey,
}

/// Which item fields become the document title, body, and metadata sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    /// Dot path of the title field.
    #[serde(default)]
    pub title: Option<String>,
    /// Dot path of the main body text.
    #[serde(default)]
    pub content: Option<String>,
    /// Dot path of an explicit identifier, preferred over the common identity fields.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Section heading -> dot path.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCrawlerConfig {
    #[serde(default)]
    pub provider: ApiProvider,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Dot path to the item array; empty means the response itself is the array.
    #[serde(default)]
    pub data_path: Option<String>,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub field_mapping: FieldMapping,
    /// Shopware 6 associations to load with each entity (`manufacturer`, `cover.media`).
    #[serde(default)]
    pub associations: Vec<String>,
}

impl ApiCrawlerConfig {
    pub fn new(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            provider: ApiProvider::Custom,
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            auth_type: AuthType::None,
            api_key_header: default_api_key_header(),
            pagination: PaginationConfig::None,
            data_path: None,
            request_delay_ms: None,
            field_mapping: FieldMapping::default(),
            associations: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: ApiProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_data_path(mut self, path: impl Into<String>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    pub fn with_field_mapping(mut self, mapping: FieldMapping) -> Self {
        self.field_mapping = mapping;
        self
    }

    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let has_endpoint =
            !self.endpoint.trim().is_empty() || self.provider.default_endpoint().is_some();
        if self.base_url.trim().is_empty() || !has_endpoint {
            return Err(ApiCrawlerError::Config(
                "missing baseUrl or endpoint".to_string(),
            ));
        }
        if let PaginationConfig::Cursor { cursor_path, .. } = &self.pagination {
            if cursor_path.trim().is_empty() {
                return Err(ApiCrawlerError::Config(
                    "cursor pagination requires cursorPath".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// `baseUrl` + `endpoint` with exactly one slash between them.
    pub fn endpoint_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.endpoint.starts_with('/') {
            format!("{}{}", base, self.endpoint)
        } else {
            format!("{}/{}", base, self.endpoint)
        }
    }
}
