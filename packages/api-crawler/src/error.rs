use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiCrawlerError>;

#[derive(Debug, Error)]
pub enum ApiCrawlerError {
    /// Invalid crawler configuration (missing base URL, bad header name)
    #[error("Invalid API crawler config: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response did not contain an item array at the configured path
    #[error("Unexpected response shape: {0}")]
    Shape(String),
}
