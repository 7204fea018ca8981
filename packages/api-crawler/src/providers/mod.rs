//! Presets for shop and ERP APIs with a known shape.
//!
//! A preset fixes the request shape (method, endpoint, pagination and item
//! path) and renders items with provider-specific markdown. Items without the
//! fields a preset relies on fall back to the generic mapping.

pub mod shopware6;
pub mod weclapp;

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::config::{ApiCrawlerConfig, ApiProvider, HttpMethod, PaginationConfig};
use crate::json_path::{extract_json_path, value_to_string};

impl ApiCrawlerConfig {
    /// Replace the request shape with the provider's. Applying twice is a no-op.
    pub fn apply_preset(mut self) -> Self {
        let Some(default_endpoint) = self.provider.default_endpoint() else {
            return self;
        };
        if self.endpoint.trim().is_empty() {
            self.endpoint = default_endpoint.to_string();
        }
        match self.provider {
            ApiProvider::Shopware6 => {
                self.endpoint = shopware6::search_endpoint(&self.endpoint);
                self.method = HttpMethod::Post;
                self.pagination = PaginationConfig::Page {
                    page_param: "page".into(),
                    page_size_param: "limit".into(),
                    page_size: shopware6::PAGE_SIZE,
                };
                self.data_path = Some("data".into());
            }
            ApiProvider::Weclapp => {
                self.method = HttpMethod::Get;
                self.pagination = PaginationConfig::Page {
                    page_param: "page".into(),
                    page_size_param: "pageSize".into(),
                    page_size: weclapp::PAGE_SIZE,
                };
                self.data_path = Some("result".into());
            }
            ApiProvider::Custom => {}
        }
        self
    }
}

/// Title, identity and body for an item of a preset provider.
pub(crate) struct PresetItem {
    pub title: Option<String>,
    pub origin_uri: Option<String>,
    pub content: String,
}

pub(crate) fn map_preset_item(raw: &Value, config: &ApiCrawlerConfig) -> Option<PresetItem> {
    match config.provider {
        ApiProvider::Custom => None,
        ApiProvider::Shopware6 => Some(shopware6::map(raw, &config.base_url)),
        ApiProvider::Weclapp => Some(weclapp::map(raw, &config.base_url)),
    }
}

/// Non-empty string or number at a dot path.
fn text(raw: &Value, path: &str) -> Option<String> {
    extract_json_path(raw, path)
        .filter(|v| v.is_string() || v.is_number())
        .map(value_to_string)
        .filter(|s| !s.trim().is_empty())
}

fn first_text(raw: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| text(raw, path))
}

fn number(raw: &Value, path: &str) -> Option<f64> {
    match extract_json_path(raw, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(raw: &Value, path: &str) -> Option<bool> {
    extract_json_path(raw, path).and_then(Value::as_bool)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn format_price(price: f64) -> String {
    format!("{:.2}", price)
}

/// Whole numbers without a fraction, everything else as is.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn base(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// `id` as a string, numbers included.
fn item_id(raw: &Value) -> Option<String> {
    text(raw, "id")
}

/// Append `## heading` and its lines when there are any.
fn push_section(sections: &mut Vec<String>, heading: &str, lines: Vec<String>) {
    if !lines.is_empty() {
        sections.push(format!("## {}\n\n{}", heading, lines.join("\n")));
    }
}

fn push_raw_data(sections: &mut Vec<String>, raw: &Value) {
    let pretty = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());
    sections.push(format!("## Raw Data\n\n```json\n{}\n```", pretty));
}

static BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static PARAGRAPH_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</p>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Rich-text descriptions to plain text.
pub(crate) fn html_to_text(html: &str) -> String {
    let text = BREAK.replace_all(html, "\n");
    let text = PARAGRAPH_END.replace_all(&text, "\n\n");
    let text = TAG.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    BLANK_RUNS.replace_all(&text, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("<p>Solid&nbsp;oak</p><p>Fits<br/>two &amp; more</p>"),
            "Solid oak\n\nFits\ntwo & more"
        );
    }

    #[test]
    fn test_presets_fix_the_request_shape() {
        let config = ApiCrawlerConfig::new("https://shop.example.com", "")
            .with_provider(ApiProvider::Shopware6)
            .apply_preset();
        assert_eq!(config.endpoint, "/api/search/product");
        assert_eq!(config.method, HttpMethod::Post);
        assert_eq!(config.data_path.as_deref(), Some("data"));
        assert_eq!(config.clone().apply_preset(), config);

        let config = ApiCrawlerConfig::new("https://acme.weclapp.com", "/webapp/api/v1/article")
            .with_provider(ApiProvider::Weclapp)
            .apply_preset();
        assert_eq!(
            config.pagination,
            PaginationConfig::Page {
                page_param: "page".into(),
                page_size_param: "pageSize".into(),
                page_size: 100,
            }
        );
        assert_eq!(config.data_path.as_deref(), Some("result"));
    }

    #[test]
    fn test_custom_config_is_untouched() {
        let config = ApiCrawlerConfig::new("https://api.example.com", "/items").with_data_path("x");
        assert_eq!(config.clone().apply_preset(), config);
    }
}
