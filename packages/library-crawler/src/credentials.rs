//! Per-crawler credential persistence.
//!
//! Values are wrapped in [`SecretString`] so they never show up in logs or
//! debug output. The file store keeps one JSON document per crawler in a
//! directory only the owner can read.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::CredentialError;
use crate::ids::CrawlerId;

/// Well-known credential keys.
pub mod keys {
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const BOX_TOKEN: &str = "boxToken";
    pub const BOX_CLIENT_ID: &str = "boxClientId";
    pub const BOX_CLIENT_SECRET: &str = "boxClientSecret";
    pub const BOX_ENTERPRISE_ID: &str = "boxEnterpriseId";
    pub const API_TOKEN: &str = "apiToken";
    pub const API_KEY: &str = "apiKey";
}

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// Only call this where the value is actually sent somewhere.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Authentication material for one crawler. Empty is a valid, expected state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, SecretString>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<SecretString>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SecretString>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.0.get(key)
    }

    /// Value for `key` if present and non-blank.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(SecretString::expose)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Missing or unreadable credentials come back empty, never as an error.
    async fn get(&self, crawler_id: CrawlerId) -> Result<Credentials, CredentialError>;

    /// `Some` replaces the whole set atomically, `None` removes it.
    async fn update(
        &self,
        crawler_id: CrawlerId,
        credentials: Option<Credentials>,
    ) -> Result<(), CredentialError>;

    async fn put(&self, crawler_id: CrawlerId, credentials: Credentials) -> Result<(), CredentialError> {
        self.update(crawler_id, Some(credentials)).await
    }

    async fn remove(&self, crawler_id: CrawlerId) -> Result<(), CredentialError> {
        self.update(crawler_id, None).await
    }
}

/// `<dir>/<crawler_id>.json`, directory mode 0700, files mode 0600.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, crawler_id: CrawlerId) -> PathBuf {
        self.dir.join(format!("{}.json", crawler_id))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, crawler_id: CrawlerId) -> Result<Credentials, CredentialError> {
        let path = self.path_for(crawler_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(crawler_id = %crawler_id, "No stored credentials");
                return Ok(Credentials::new());
            }
            Err(e) => {
                warn!(crawler_id = %crawler_id, path = %path.display(), error = %e, "Unreadable credentials file");
                return Ok(Credentials::new());
            }
        };

        match serde_json::from_str(&raw) {
            Ok(credentials) => Ok(credentials),
            Err(e) => {
                warn!(crawler_id = %crawler_id, path = %path.display(), error = %e, "Corrupt credentials file");
                Ok(Credentials::new())
            }
        }
    }

    async fn update(
        &self,
        crawler_id: CrawlerId,
        credentials: Option<Credentials>,
    ) -> Result<(), CredentialError> {
        let path = self.path_for(crawler_id);

        let Some(credentials) = credentials else {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(crawler_id = %crawler_id, "Removed credentials"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        };

        let dir = self.dir.clone();
        let json = serde_json::to_vec_pretty(&credentials).map_err(std::io::Error::other)?;
        tokio::task::spawn_blocking(move || write_restricted(&dir, &path, &json))
            .await
            .map_err(std::io::Error::other)??;

        debug!(crawler_id = %crawler_id, "Stored credentials");
        Ok(())
    }
}

/// Write through a temp file in the same directory and rename over the target.
fn write_restricted(dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // NamedTempFile is created 0600 on unix
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))?;
    }
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-process store for tests and ephemeral setups.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    inner: Arc<RwLock<HashMap<CrawlerId, Credentials>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with(self, crawler_id: CrawlerId, credentials: Credentials) -> Self {
        self.inner.write().await.insert(crawler_id, credentials);
        self
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, crawler_id: CrawlerId) -> Result<Credentials, CredentialError> {
        Ok(self
            .inner
            .read()
            .await
            .get(&crawler_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update(
        &self,
        crawler_id: CrawlerId,
        credentials: Option<Credentials>,
    ) -> Result<(), CredentialError> {
        let mut inner = self.inner.write().await;
        match credentials {
            Some(credentials) => inner.insert(crawler_id, credentials),
            None => inner.remove(&crawler_id),
        };
        Ok(())
    }
}
