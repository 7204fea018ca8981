//! Turns raw API items into titled markdown documents with a stable identity.

use serde_json::Value;

use crate::config::{ApiCrawlerConfig, FieldMapping};
use crate::json_path::{extract_json_path, value_to_string};
use crate::providers::map_preset_item;

/// Fields tried for the title when no mapping is configured.
const TITLE_FIELDS: &[&str] = &["title", "name", "label", "displayName", "subject", "heading"];

/// A crawled API item, ready to be stored as a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiItem {
    pub title: String,
    pub content: String,
    /// Stable identity of the item, `None` when the payload has no usable field.
    pub origin_uri: Option<String>,
    pub raw: Value,
}

pub fn map_item(raw: Value, config: &ApiCrawlerConfig) -> ApiItem {
    let mapping = &config.field_mapping;
    let preset = map_preset_item(&raw, config);
    let (title, origin_uri, content) = match preset {
        Some(preset) => (
            preset
                .title
                .or_else(|| extract_title(&raw, mapping))
                .unwrap_or_default(),
            preset
                .origin_uri
                .or_else(|| build_origin_uri(&raw, mapping, config)),
            preset.content,
        ),
        None => {
            let title = extract_title(&raw, mapping).unwrap_or_default();
            let origin_uri = build_origin_uri(&raw, mapping, config);
            let content = render_markdown(&raw, &title, mapping);
            (title, origin_uri, content)
        }
    };

    ApiItem {
        title,
        content,
        origin_uri,
        raw,
    }
}

fn extract_title(raw: &Value, mapping: &FieldMapping) -> Option<String> {
    if let Some(path) = &mapping.title {
        if let Some(title) = extract_json_path(raw, path).map(value_to_string) {
            if !title.trim().is_empty() {
                return Some(title.trim().to_string());
            }
        }
    }

    TITLE_FIELDS.iter().find_map(|field| match raw.get(*field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// Identity from the first of: mapped identifier, `url`, `id`, `sku`, `title`.
fn build_origin_uri(raw: &Value, mapping: &FieldMapping, config: &ApiCrawlerConfig) -> Option<String> {
    let scalar = |path: &str| {
        extract_json_path(raw, path)
            .filter(|v| !v.is_null())
            .map(value_to_string)
            .filter(|s| !s.trim().is_empty())
    };
    let endpoint = config.endpoint_url();

    if let Some(field) = &mapping.identifier {
        if let Some(value) = scalar(field) {
            return Some(format!("{}#{}={}", endpoint, field, value));
        }
    }
    if let Some(url) = scalar("url") {
        return Some(url);
    }
    for field in ["id", "sku", "title"] {
        if let Some(value) = scalar(field) {
            return Some(format!("{}#{}={}", endpoint, field, value));
        }
    }
    None
}

/// `# Title`, the mapped body, then one `## Field` section per metadata entry.
/// Without any mapping every top-level field except the title gets a section.
fn render_markdown(raw: &Value, title: &str, mapping: &FieldMapping) -> String {
    let heading = if title.is_empty() { "Item" } else { title };
    let mut sections = vec![format!("# {}", heading)];

    if let Some(path) = &mapping.content {
        let body = extract_json_path(raw, path)
            .map(value_to_string)
            .unwrap_or_default();
        if !body.trim().is_empty() {
            sections.push(body.trim().to_string());
        }
    }

    if !mapping.metadata.is_empty() {
        for (label, path) in &mapping.metadata {
            if let Some(value) = extract_json_path(raw, path).filter(|v| !v.is_null()) {
                sections.push(render_section(label, value));
            }
        }
    } else if mapping.content.is_none() {
        if let Value::Object(fields) = raw {
            for (key, value) in fields {
                if value.is_null() || value.as_str() == Some(title) {
                    continue;
                }
                sections.push(render_section(&humanize(key), value));
            }
        }
    }

    if sections.len() == 1 {
        sections.push("No content available".to_string());
    }
    sections.join("\n\n")
}

fn render_section(label: &str, value: &Value) -> String {
    match value {
        Value::Object(_) | Value::Array(_)
            if value
                .as_array()
                .map_or(true, |items| items.iter().any(|i| i.is_object() || i.is_array())) =>
        {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            format!("## {}\n\n```json\n{}\n```", label, pretty)
        }
        _ => format!("## {}\n\n{}", label, value_to_string(value)),
    }
}

/// `displayName` / `display_name` -> `Display name`.
fn humanize(key: &str) -> String {
    let mut words = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c == '_' || c == '-' {
            words.push(' ');
        } else if c.is_uppercase() && i > 0 {
            words.push(' ');
            words.extend(c.to_lowercase());
        } else if i == 0 {
            words.extend(c.to_uppercase());
        } else {
            words.push(c);
        }
    }
    words
}
