//! Typed errors for the crawl core.
//!
//! Two severities: [`CrawlError`] ends a crawl before or instead of yielding
//! outcomes; [`ItemError`] is caught at the item boundary and becomes an
//! `error` outcome while the crawl continues.

use thiserror::Error;

use crate::ids::CrawlerId;
use crate::model::SourceKind;

/// Fatal errors. The outcome stream ends immediately after yielding one of these.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Descriptor or provider configuration is malformed
    #[error("invalid source descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// Required credential keys are absent for an authenticated source
    #[error("missing credentials for {kind} source: {missing}")]
    MissingCredentials { kind: SourceKind, missing: String },

    /// Provider rejected the supplied credentials
    #[error("authentication failed: {0}")]
    Authentication(#[source] ProviderError),

    /// Could not establish the initial connection or session
    #[error("could not connect to provider: {0}")]
    Connect(#[source] ProviderError),

    /// No strategy registered for the descriptor's kind
    #[error("no crawl strategy registered for {0} sources")]
    UnsupportedSource(SourceKind),

    /// Another run of this crawler has not finished yet
    #[error("crawler {0} is already running")]
    RunInProgress(CrawlerId),

    #[error("catalog error: {0}")]
    Catalog(#[source] CatalogError),

    #[error("credential store error: {0}")]
    Credentials(#[from] CredentialError),
}

impl From<CatalogError> for CrawlError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::RunInProgress(id) => CrawlError::RunInProgress(id),
            other => CrawlError::Catalog(other),
        }
    }
}

impl CrawlError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        CrawlError::InvalidDescriptor {
            reason: reason.into(),
        }
    }
}

/// Failures while processing a single discovered item.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by provider clients, normalised across providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure (connection refused, timeout, broken stream)
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Provider answered with a non-success status
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Payload could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// Provider reported a failure of its own (job error event, bad response shape)
    #[error("{0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// True when the provider rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Api { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ProviderError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ProviderError::Http(Box::new(err)),
        }
    }
}

impl From<smb_crawler_client::SmbCrawlerError> for ProviderError {
    fn from(err: smb_crawler_client::SmbCrawlerError) -> Self {
        use smb_crawler_client::SmbCrawlerError;
        match err {
            SmbCrawlerError::Http(e) => ProviderError::Http(Box::new(e)),
            SmbCrawlerError::Api { status, message } => ProviderError::Api { status, message },
            SmbCrawlerError::Parse(msg) => ProviderError::Parse(msg),
        }
    }
}

impl From<box_client::BoxError> for ProviderError {
    fn from(err: box_client::BoxError) -> Self {
        use box_client::BoxError;
        match err {
            BoxError::Http(e) => ProviderError::Http(Box::new(e)),
            BoxError::Api { status, message } => ProviderError::Api { status, message },
            BoxError::Auth(message) => ProviderError::Api {
                status: 401,
                message,
            },
        }
    }
}

impl From<api_crawler::ApiCrawlerError> for ProviderError {
    fn from(err: api_crawler::ApiCrawlerError) -> Self {
        use api_crawler::ApiCrawlerError;
        match err {
            ApiCrawlerError::Http(e) => ProviderError::Http(Box::new(e)),
            ApiCrawlerError::Api { status, message } => ProviderError::Api { status, message },
            ApiCrawlerError::Shape(msg) => ProviderError::Protocol(msg),
            ApiCrawlerError::Config(msg) => ProviderError::Parse(msg),
        }
    }
}

/// Errors from the file catalog collaborator.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("crawler {0} is already running")]
    RunInProgress(CrawlerId),

    #[error("catalog backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the byte storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the credential store.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

pub type ItemResult<T> = std::result::Result<T, ItemError>;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_in_progress_is_lifted_out_of_catalog() {
        let crawler = CrawlerId::new();
        let err: CrawlError = CatalogError::RunInProgress(crawler).into();
        assert!(matches!(err, CrawlError::RunInProgress(id) if id == crawler));

        let err: CrawlError = CatalogError::NotFound {
            entity: "file",
            id: "x".into(),
        }
        .into();
        assert!(matches!(err, CrawlError::Catalog(_)));
    }

    #[test]
    fn test_provider_auth_detection() {
        assert!(ProviderError::Api { status: 401, message: String::new() }.is_auth());
        assert!(ProviderError::Api { status: 403, message: String::new() }.is_auth());
        assert!(!ProviderError::Parse("x".into()).is_auth());
    }

    #[test]
    fn test_box_auth_maps_to_unauthorized() {
        let err: ProviderError = box_client::BoxError::Auth("invalid_client".into()).into();
        assert!(err.is_auth());
    }
}
