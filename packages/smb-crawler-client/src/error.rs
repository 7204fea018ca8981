//! Error types for the SMB crawler client.

use thiserror::Error;

/// Result type for SMB crawler client operations.
pub type Result<T> = std::result::Result<T, SmbCrawlerError>;

#[derive(Debug, Error)]
pub enum SmbCrawlerError {
    /// Network error (connection refused, timeout, broken stream)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the crawler service
    #[error("Crawler service error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Malformed event or response payload
    #[error("Parse error: {0}")]
    Parse(String),
}
