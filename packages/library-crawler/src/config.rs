use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::size_guard::{SizeGuard, DEFAULT_REJECT_BYTES, DEFAULT_WARN_BYTES};

pub const DEFAULT_SMB_CRAWLER_URL: &str = "http://localhost:3006";

/// Crawler configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    pub size_warn_bytes: u64,
    pub size_reject_bytes: u64,
    pub credentials_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub smb_crawler_url: String,
    /// Archive records the source no longer lists after a complete run
    pub archive_missing: bool,
    pub database_url: Option<String>,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            size_warn_bytes: DEFAULT_WARN_BYTES,
            size_reject_bytes: DEFAULT_REJECT_BYTES,
            credentials_dir: default_credentials_dir(),
            staging_dir: env::temp_dir(),
            storage_dir: PathBuf::from("./uploads"),
            smb_crawler_url: DEFAULT_SMB_CRAWLER_URL.to_string(),
            archive_missing: true,
            database_url: None,
        }
    }
}

impl CrawlerSettings {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Unset or blank
    /// variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let size_warn_bytes = match get("CRAWLER_SIZE_WARN_BYTES") {
            Some(v) => parse_bytes("CRAWLER_SIZE_WARN_BYTES", &v)?,
            None => defaults.size_warn_bytes,
        };
        let size_reject_bytes = match get("CRAWLER_SIZE_REJECT_BYTES") {
            Some(v) => parse_bytes("CRAWLER_SIZE_REJECT_BYTES", &v)?,
            None => defaults.size_reject_bytes,
        };
        if size_warn_bytes > size_reject_bytes {
            return Err(ConfigError::Invalid {
                var: "CRAWLER_SIZE_WARN_BYTES",
                reason: format!(
                    "warn threshold {} is above reject threshold {}",
                    size_warn_bytes, size_reject_bytes
                ),
            });
        }

        let archive_missing = match get("CRAWLER_ARCHIVE_MISSING") {
            Some(v) => parse_bool("CRAWLER_ARCHIVE_MISSING", &v)?,
            None => defaults.archive_missing,
        };

        Ok(Self {
            size_warn_bytes,
            size_reject_bytes,
            credentials_dir: get("CRAWLER_CREDENTIALS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_dir),
            staging_dir: get("CRAWLER_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            storage_dir: get("CRAWLER_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            smb_crawler_url: get("SMB_CRAWLER_URL").unwrap_or(defaults.smb_crawler_url),
            archive_missing,
            database_url: get("DATABASE_URL"),
        })
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn with_size_limits(mut self, warn_bytes: u64, reject_bytes: u64) -> Self {
        self.size_warn_bytes = warn_bytes;
        self.size_reject_bytes = reject_bytes;
        self
    }

    pub fn with_archive_missing(mut self, archive: bool) -> Self {
        self.archive_missing = archive;
        self
    }

    pub fn size_guard(&self) -> SizeGuard {
        SizeGuard::new(self.size_warn_bytes, self.size_reject_bytes)
    }
}

fn default_credentials_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".library-crawler")
        .join("credentials")
}

fn parse_bytes(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        reason: format!("expected a byte count, got {:?}", value),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("expected true or false, got {:?}", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = CrawlerSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.size_warn_bytes, 100 * 1024 * 1024);
        assert_eq!(settings.size_reject_bytes, 500 * 1024 * 1024);
        assert_eq!(settings.smb_crawler_url, "http://localhost:3006");
        assert!(settings.archive_missing);
        assert!(settings.database_url.is_none());
        assert!(settings.credentials_dir.ends_with(".library-crawler/credentials"));
    }

    #[test]
    fn test_overrides() {
        let settings = CrawlerSettings::from_lookup(lookup(&[
            ("CRAWLER_SIZE_WARN_BYTES", "10"),
            ("CRAWLER_SIZE_REJECT_BYTES", "20"),
            ("CRAWLER_ARCHIVE_MISSING", "no"),
            ("SMB_CRAWLER_URL", "http://smb:9000"),
            ("DATABASE_URL", "postgres://localhost/library"),
        ]))
        .unwrap();
        assert_eq!(settings.size_guard().reject_bytes(), 20);
        assert!(!settings.archive_missing);
        assert_eq!(settings.smb_crawler_url, "http://smb:9000");
        assert_eq!(settings.database_url.as_deref(), Some("postgres://localhost/library"));
    }

    #[test]
    fn test_invalid_values() {
        let err = CrawlerSettings::from_lookup(lookup(&[("CRAWLER_SIZE_WARN_BYTES", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CRAWLER_SIZE_WARN_BYTES", .. }));

        assert!(CrawlerSettings::from_lookup(lookup(&[("CRAWLER_ARCHIVE_MISSING", "maybe")])).is_err());
        assert!(CrawlerSettings::from_lookup(lookup(&[
            ("CRAWLER_SIZE_WARN_BYTES", "30"),
            ("CRAWLER_SIZE_REJECT_BYTES", "20"),
        ]))
        .is_err());
    }
}
