//! Pure Box content API client.
//!
//! Covers the three calls a folder crawl needs: paginated folder listing,
//! authenticated file download, and the OAuth2 client-credentials token
//! exchange for server-to-server apps.
//!
//! # Example
//!
//! ```rust,ignore
//! use box_client::BoxClient;
//!
//! let client = BoxClient::new("developer-token".into());
//! let page = client.list_folder_items("0", 0).await?;
//! for item in &page.entries {
//!     println!("{} {}", item.id, item.name);
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{BoxError, Result};
pub use types::{BoxFolderItems, BoxItem, BoxItemType};

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use secrecy::{ExposeSecret, SecretBox};
use std::sync::Arc;
use types::TokenResponse;

const API_BASE_URL: &str = "https://api.box.com/2.0";
const TOKEN_URL: &str = "https://api.box.com/oauth2/token";
const LISTING_FIELDS: &str = "type,id,name,size,modified_at,content_modified_at";

/// Box API max page size for folder listings.
pub const MAX_PAGE_SIZE: u64 = 1000;

#[derive(Clone)]
pub struct BoxClient {
    client: reqwest::Client,
    token: Arc<SecretBox<str>>,
    base_url: String,
}

impl BoxClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: Arc::new(SecretBox::new(token.into_boxed_str())),
            base_url: API_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Obtain an access token via the client-credentials grant and build a client with it.
    ///
    /// With an `enterprise_id` the token acts as the enterprise service account.
    pub async fn authenticate(
        client_id: &str,
        client_secret: &str,
        enterprise_id: Option<&str>,
    ) -> Result<Self> {
        let token = exchange_client_credentials(
            &reqwest::Client::new(),
            TOKEN_URL,
            client_id,
            client_secret,
            enterprise_id,
        )
        .await?;
        Ok(Self::new(token))
    }

    /// List one page of a folder's items.
    pub async fn list_folder_items(&self, folder_id: &str, offset: u64) -> Result<BoxFolderItems> {
        let url = format!("{}/folders/{}/items", self.base_url, folder_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .query(&[
                ("fields", LISTING_FIELDS.to_string()),
                ("limit", MAX_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BoxError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let page: BoxFolderItems = resp.json().await?;
        tracing::debug!(
            folder_id,
            offset,
            entries = page.entries.len(),
            total = page.total_count,
            "Listed Box folder page"
        );
        Ok(page)
    }

    /// Download a file's content. Box answers with a redirect to the blob
    /// host, which reqwest follows.
    pub async fn download_file(&self, file_id: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let url = format!("{}/files/{}/content", self.base_url, file_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BoxError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(BoxError::from))
            .boxed())
    }
}

async fn exchange_client_credentials(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    enterprise_id: Option<&str>,
) -> Result<String> {
    let mut form = vec![
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ];
    if let Some(enterprise_id) = enterprise_id {
        form.push(("box_subject_type", "enterprise"));
        form.push(("box_subject_id", enterprise_id));
    }

    let resp = client.post(token_url).form(&form).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(BoxError::Auth(format!("{} {}", status.as_u16(), body)));
    }

    let token: TokenResponse = resp.json().await?;
    tracing::info!("Obtained Box access token via client credentials");
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_listing_deserializes() {
        let json = r#"{
            "entries": [
                {"type": "file", "id": "11", "name": "report.pdf", "size": 2048,
                 "modified_at": "2024-03-01T12:00:00-08:00",
                 "content_modified_at": "2024-02-28T09:00:00-08:00"},
                {"type": "folder", "id": "22", "name": "Archive"},
                {"type": "web_link", "id": "33", "name": "Intranet"}
            ],
            "total_count": 3,
            "offset": 0,
            "limit": 1000
        }"#;

        let page: BoxFolderItems = serde_json::from_str(json).unwrap();
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.entries[0].item_type, BoxItemType::File);
        assert_eq!(page.entries[0].size, Some(2048));
        assert_eq!(
            page.entries[0].last_modified(),
            page.entries[0].content_modified_at
        );
        assert_eq!(page.entries[1].item_type, BoxItemType::Folder);
        assert!(page.entries[1].last_modified().is_none());
        assert_eq!(page.entries[2].item_type, BoxItemType::WebLink);
    }

    #[test]
    fn test_auth_errors() {
        assert!(BoxError::Auth("denied".into()).is_auth());
        assert!(BoxError::Api { status: 401, message: String::new() }.is_auth());
        assert!(!BoxError::Api { status: 404, message: String::new() }.is_auth());
    }

    #[test]
    fn test_base_url_override() {
        let client = BoxClient::new("t".into()).with_base_url("http://localhost:9000/2.0/");
        assert_eq!(client.base_url, "http://localhost:9000/2.0");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_not_an_auth_error() {
        let client = BoxClient::new("t".into()).with_base_url("http://127.0.0.1:9");
        let err = client.list_folder_items("0", 0).await.unwrap_err();
        assert!(matches!(err, BoxError::Http(_)));
        assert!(!err.is_auth());
    }
}
