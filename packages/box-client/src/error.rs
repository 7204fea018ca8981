use thiserror::Error;

pub type Result<T> = std::result::Result<T, BoxError>;

#[derive(Debug, Error)]
pub enum BoxError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Box API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Token exchange rejected (bad client id/secret, app not authorized)
    #[error("Box authentication failed: {0}")]
    Auth(String),
}

impl BoxError {
    /// True for 401/403 responses and rejected token exchanges.
    pub fn is_auth(&self) -> bool {
        match self {
            BoxError::Auth(_) => true,
            BoxError::Api { status, .. } => *status == 401 || *status == 403,
            BoxError::Http(_) => false,
        }
    }
}
