//! File filter policy.
//!
//! Rules are evaluated in a fixed order and the first failing rule wins:
//! MIME allow-list, include patterns, exclude patterns, then size bounds.
//! Patterns are case-insensitive regexes tested against both the relative
//! path and the file name. Invalid patterns are skipped with a warning.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::{CrawlError, CrawlResult};
use crate::mime::resolve_mime_type;
use crate::model::DiscoveredFile;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Per-crawler filter settings. Sizes are in megabytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFilterConfig {
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub max_file_size: Option<f64>,
    #[serde(default)]
    pub min_file_size: Option<f64>,
    #[serde(default)]
    pub allowed_mime_types: Vec<String>,
}

impl FileFilterConfig {
    pub fn with_include(mut self, pattern: impl Into<String>) -> Self {
        self.include_patterns.push(pattern.into());
        self
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    pub fn with_max_size_mb(mut self, mb: f64) -> Self {
        self.max_file_size = Some(mb);
        self
    }

    pub fn with_min_size_mb(mut self, mb: f64) -> Self {
        self.min_file_size = Some(mb);
        self
    }

    pub fn with_allowed_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.allowed_mime_types.push(mime.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.include_patterns.is_empty()
            && self.exclude_patterns.is_empty()
            && self.max_file_size.is_none()
            && self.min_file_size.is_none()
            && self.allowed_mime_types.is_empty()
    }

    /// Size bounds must be non-negative and ordered. Bad patterns are not an error.
    pub fn validate(&self) -> CrawlResult<()> {
        for (name, value) in [("maxFileSize", self.max_file_size), ("minFileSize", self.min_file_size)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(CrawlError::invalid(format!("{} must be a non-negative number", name)));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_file_size, self.max_file_size) {
            if max > 0.0 && min > max {
                return Err(CrawlError::invalid("minFileSize exceeds maxFileSize"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterType {
    MimeType,
    IncludePattern,
    ExcludePattern,
    FileSize,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::MimeType => "mimeType",
            FilterType::IncludePattern => "includePattern",
            FilterType::ExcludePattern => "excludePattern",
            FilterType::FileSize => "fileSize",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub filter_type: Option<FilterType>,
    pub filter_value: Option<String>,
}

impl FilterDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            filter_type: None,
            filter_value: None,
        }
    }

    fn deny(filter_type: FilterType, value: impl Into<String>, reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            filter_type: Some(filter_type),
            filter_value: Some(value.into()),
        }
    }
}

/// A filter config with its patterns compiled once per crawl.
#[derive(Debug, Clone)]
pub struct FileFilter {
    config: FileFilterConfig,
    include: Vec<(String, Regex)>,
    exclude: Vec<(String, Regex)>,
}

impl FileFilter {
    pub fn new(config: FileFilterConfig) -> Self {
        let include = compile_patterns(&config.include_patterns, "include");
        let exclude = compile_patterns(&config.exclude_patterns, "exclude");
        Self {
            config,
            include,
            exclude,
        }
    }

    pub fn config(&self) -> &FileFilterConfig {
        &self.config
    }

    pub fn evaluate(&self, file: &DiscoveredFile) -> FilterDecision {
        let name = &file.name;

        if !self.config.allowed_mime_types.is_empty() {
            let mime = resolve_mime_type(&file.name, file.mime_type_hint.as_deref());
            let allowed = self
                .config
                .allowed_mime_types
                .iter()
                .any(|m| m.eq_ignore_ascii_case(&mime));
            if !allowed {
                return FilterDecision::deny(
                    FilterType::MimeType,
                    self.config.allowed_mime_types.join(","),
                    format!(
                        "File \"{}\" MIME type \"{}\" is not in allowed types: {}",
                        name,
                        mime,
                        self.config.allowed_mime_types.join(", ")
                    ),
                );
            }
        }

        if !self.config.include_patterns.is_empty() {
            let included = self
                .include
                .iter()
                .any(|(_, re)| re.is_match(&file.relative_path) || re.is_match(name));
            if !included {
                // Report the first pattern that compiled, falling back to the raw first one
                let reported = self
                    .include
                    .first()
                    .map(|(p, _)| p.clone())
                    .or_else(|| self.config.include_patterns.first().cloned())
                    .unwrap_or_default();
                return FilterDecision::deny(
                    FilterType::IncludePattern,
                    reported,
                    format!("File \"{}\" does not match any include patterns", name),
                );
            }
        }

        if let Some((pattern, _)) = self
            .exclude
            .iter()
            .find(|(_, re)| re.is_match(&file.relative_path) || re.is_match(name))
        {
            return FilterDecision::deny(
                FilterType::ExcludePattern,
                pattern.clone(),
                format!("File \"{}\" matches exclude pattern: {}", name, pattern),
            );
        }

        if let Some(size) = file.byte_size {
            if let Some(max) = self.config.max_file_size.filter(|mb| *mb > 0.0) {
                if size as f64 > max * BYTES_PER_MB {
                    return FilterDecision::deny(
                        FilterType::FileSize,
                        format!("max:{}", max),
                        format!(
                            "File \"{}\" size {} exceeds maximum limit of {} MB",
                            name,
                            format_file_size(size),
                            max
                        ),
                    );
                }
            }
            if let Some(min) = self.config.min_file_size.filter(|mb| *mb > 0.0) {
                if (size as f64) < min * BYTES_PER_MB {
                    return FilterDecision::deny(
                        FilterType::FileSize,
                        format!("min:{}", min),
                        format!(
                            "File \"{}\" size {} is below minimum limit of {} MB",
                            name,
                            format_file_size(size),
                            min
                        ),
                    );
                }
            }
        }

        FilterDecision::allow()
    }
}

/// Pure one-shot evaluation. Prefer [`FileFilter`] when filtering many files.
pub fn apply_file_filters(file: &DiscoveredFile, config: &FileFilterConfig) -> FilterDecision {
    FileFilter::new(config.clone()).evaluate(file)
}

fn compile_patterns(patterns: &[String], label: &str) -> Vec<(String, Regex)> {
    patterns
        .iter()
        .filter_map(|pattern| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => Some((pattern.clone(), re)),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Skipping invalid {} pattern", label);
                    None
                }
            }
        })
        .collect()
}

/// Human readable size, e.g. `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, path: &str, size: u64) -> DiscoveredFile {
        DiscoveredFile::new("id", name, format!("smb://nas/{}", path))
            .with_relative_path(path)
            .with_size(size)
    }

    #[test]
    fn test_no_rules_allows_everything() {
        let decision = apply_file_filters(&file("a.bin", "x/a.bin", 1), &FileFilterConfig::default());
        assert!(decision.allowed);
        assert!(decision.filter_type.is_none());
    }

    #[test]
    fn test_include_matches_path_or_name_case_insensitively() {
        let config = FileFilterConfig::default().with_include(r"\.(?:pdf|docx?)$");
        assert!(apply_file_filters(&file("Report.PDF", "docs/Report.PDF", 10), &config).allowed);

        let denied = apply_file_filters(&file("notes.txt", "docs/notes.txt", 10), &config);
        assert!(!denied.allowed);
        assert_eq!(denied.filter_type, Some(FilterType::IncludePattern));
        assert_eq!(denied.filter_value.as_deref(), Some(r"\.(?:pdf|docx?)$"));
    }

    #[test]
    fn test_exclude_reports_matching_pattern() {
        let config = FileFilterConfig::default()
            .with_exclude("_old")
            .with_exclude("archive");
        let decision = apply_file_filters(&file("plan.pdf", "Archive/plan.pdf", 10), &config);
        assert!(!decision.allowed);
        assert_eq!(decision.filter_type, Some(FilterType::ExcludePattern));
        assert_eq!(decision.filter_value.as_deref(), Some("archive"));
        assert!(decision.reason.unwrap().contains("archive"));
    }

    #[test]
    fn test_include_runs_before_exclude() {
        let config = FileFilterConfig::default()
            .with_include(r"\.pdf$")
            .with_exclude("draft");
        let decision = apply_file_filters(&file("draft.pdf", "draft.pdf", 10), &config);
        assert_eq!(decision.filter_type, Some(FilterType::ExcludePattern));
    }

    #[test]
    fn test_mime_allow_list_runs_first() {
        let config = FileFilterConfig::default()
            .with_allowed_mime_type("application/pdf")
            .with_exclude("report");
        let decision = apply_file_filters(&file("report.docx", "report.docx", 10), &config);
        assert!(!decision.allowed);
        assert_eq!(decision.filter_type, Some(FilterType::MimeType));
        assert_eq!(decision.filter_value.as_deref(), Some("application/pdf"));
        assert!(decision.reason.unwrap().contains("application/pdf"));
    }

    #[test]
    fn test_mime_hint_overrides_extension() {
        let config = FileFilterConfig::default().with_allowed_mime_type("text/markdown");
        let page = file("Home", "Home", 10).with_mime_type("text/markdown");
        assert!(apply_file_filters(&page, &config).allowed);
    }

    #[test]
    fn test_size_bounds_in_megabytes() {
        let config = FileFilterConfig::default()
            .with_max_size_mb(5.0)
            .with_min_size_mb(0.001);

        let big = apply_file_filters(&file("big.pdf", "big.pdf", 6 * 1024 * 1024), &config);
        assert_eq!(big.filter_type, Some(FilterType::FileSize));
        assert_eq!(big.filter_value.as_deref(), Some("max:5"));
        assert!(big.reason.unwrap().contains("exceeds maximum limit"));

        let tiny = apply_file_filters(&file("tiny.pdf", "tiny.pdf", 10), &config);
        assert_eq!(tiny.filter_value.as_deref(), Some("min:0.001"));
        assert!(tiny.reason.unwrap().contains("below minimum limit"));

        assert!(apply_file_filters(&file("ok.pdf", "ok.pdf", 1024 * 1024), &config).allowed);
    }

    #[test]
    fn test_unknown_size_skips_size_rules() {
        let config = FileFilterConfig::default().with_max_size_mb(1.0);
        let unknown = DiscoveredFile::new("id", "page", "https://example.com/page");
        assert!(apply_file_filters(&unknown, &config).allowed);
    }

    #[test]
    fn test_invalid_patterns_are_skipped() {
        let config = FileFilterConfig::default()
            .with_exclude("([unclosed")
            .with_exclude("tmp");
        let filter = FileFilter::new(config);
        assert!(filter.evaluate(&file("a.pdf", "a.pdf", 1)).allowed);
        assert!(!filter.evaluate(&file("a.tmp", "a.tmp", 1)).allowed);
    }

    #[test]
    fn test_config_from_json() {
        let config: FileFilterConfig = serde_json::from_str(
            r#"{"includePatterns": ["\\.pdf$"], "maxFileSize": 5, "allowedMimeTypes": ["application/pdf"]}"#,
        )
        .unwrap();
        assert_eq!(config.include_patterns, vec![r"\.pdf$"]);
        assert_eq!(config.max_file_size, Some(5.0));
        assert!(config.exclude_patterns.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = FileFilterConfig::default()
            .with_min_size_mb(10.0)
            .with_max_size_mb(1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
    }
}
