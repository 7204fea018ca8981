//! Shopware 6 Admin API.
//!
//! Entities are paged through `POST /api/search/<entity>` with a JSON body
//! (`page`, `limit`, `associations`). Translated fields are preferred over
//! the raw ones.

use serde_json::{json, Map, Value};

use super::{
    base, first_text, flag, format_number, format_price, html_to_text, item_id, number,
    push_raw_data, push_section, text, yes_no, PresetItem,
};
use crate::json_path::extract_json_path;

pub const PAGE_SIZE: u32 = 50;

/// `/api/product` -> `/api/search/product`; search endpoints are kept.
pub fn search_endpoint(endpoint: &str) -> String {
    if endpoint.contains("/search/") {
        return endpoint.to_string();
    }
    match endpoint.strip_prefix("/api/") {
        Some(entity) => format!("/api/search/{}", entity),
        None => endpoint.to_string(),
    }
}

/// `["manufacturer", "cover.media"]` -> `{"manufacturer": {}, "cover": {"media": {}}}`
fn associations_object(associations: &[String]) -> Option<Value> {
    let mut root = Map::new();
    for association in associations.iter().filter(|a| !a.trim().is_empty()) {
        let mut current = &mut root;
        for part in association.trim().split('.') {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(next) = entry else {
                break;
            };
            current = next;
        }
    }
    (!root.is_empty()).then_some(Value::Object(root))
}

/// Search API body for one page.
pub fn request_body(page: u32, associations: &[String]) -> Value {
    let mut body = json!({ "page": page, "limit": PAGE_SIZE });
    if let Some(associations) = associations_object(associations) {
        body["associations"] = associations;
    }
    body
}

fn title(raw: &Value) -> Option<String> {
    first_text(raw, &["translated.name", "name"])
}

pub(super) fn map(raw: &Value, base_url: &str) -> PresetItem {
    let title = title(raw);
    let origin_uri = item_id(raw).map(|id| format!("{}/api/product/{}", base(base_url), id));
    let content = render(raw, title.as_deref().unwrap_or("Product"));
    PresetItem {
        title,
        origin_uri,
        content,
    }
}

fn render(raw: &Value, title: &str) -> String {
    let mut sections = vec![format!("# {}", title)];

    let mut info = Vec::new();
    for (label, path) in [
        ("Product Number", "productNumber"),
        ("EAN", "ean"),
        ("Manufacturer Number", "manufacturerNumber"),
    ] {
        if let Some(value) = text(raw, path) {
            info.push(format!("- **{}:** {}", label, value));
        }
    }
    if let Some(name) = first_text(raw, &["manufacturer.translated.name", "manufacturer.name"]) {
        info.push(format!("- **Manufacturer:** {}", name));
    }
    if let Some(link) = text(raw, "manufacturer.link") {
        info.push(format!("- **Manufacturer Link:** {}", link));
    }
    let unit_name = first_text(raw, &["unit.translated.name", "unit.name"]);
    let unit_code = first_text(raw, &["unit.translated.shortCode", "unit.shortCode"]);
    if unit_name.is_some() || unit_code.is_some() {
        let code = unit_code.map(|c| format!(" ({})", c)).unwrap_or_default();
        info.push(format!("- **Unit:** {}{}", unit_name.unwrap_or_default(), code));
    }
    if let Some(rate) = number(raw, "tax.taxRate") {
        let name = text(raw, "tax.name")
            .map(|n| format!(" ({})", n))
            .unwrap_or_default();
        info.push(format!("- **Tax Rate:** {}%{}", format_number(rate), name));
    }
    push_section(&mut sections, "Product Information", info);

    let mut pricing = Vec::new();
    if let Some(gross) = number(raw, "price.0.gross") {
        pricing.push(format!("- **Gross Price:** {} EUR", format_price(gross)));
    }
    if let Some(net) = number(raw, "price.0.net") {
        pricing.push(format!("- **Net Price:** {} EUR", format_price(net)));
    }
    if let Some(net) = number(raw, "purchasePrices.0.net").filter(|n| *n > 0.0) {
        pricing.push(format!("- **Purchase Price (Net):** {} EUR", format_price(net)));
    }
    push_section(&mut sections, "Pricing", pricing);

    if let Some(description) = first_text(raw, &["translated.description", "description"]) {
        sections.push(format!("## Description\n\n{}", html_to_text(&description)));
    }

    let categories = list(raw, "categories")
        .iter()
        .filter_map(|category| {
            let breadcrumb = ["translated.breadcrumb", "breadcrumb"]
                .iter()
                .filter_map(|path| extract_json_path(category, path)?.as_array())
                .find(|crumbs| !crumbs.is_empty())
                .map(|crumbs| {
                    crumbs
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(" > ")
                });
            breadcrumb
                .or_else(|| first_text(category, &["translated.name", "name"]))
                .map(|name| format!("- {}", name))
        })
        .collect();
    push_section(&mut sections, "Categories", categories);

    let properties = list(raw, "properties");
    if !properties.is_empty() {
        let mut rows = vec!["| Property | Value |".to_string(), "|----------|-------|".to_string()];
        for property in properties {
            let group = first_text(property, &["group.translated.name", "group.name"])
                .unwrap_or_else(|| "Property".to_string());
            let value = first_text(property, &["translated.name", "name"]).unwrap_or_default();
            rows.push(format!("| {} | {} |", group, value));
        }
        push_section(&mut sections, "Properties", rows);
    }

    let mut dimensions = Vec::new();
    for (label, path, unit) in [
        ("Weight", "weight", "kg"),
        ("Length", "length", "mm"),
        ("Width", "width", "mm"),
        ("Height", "height", "mm"),
    ] {
        if let Some(value) = number(raw, path) {
            dimensions.push(format!("- **{}:** {} {}", label, format_number(value), unit));
        }
    }
    push_section(&mut sections, "Dimensions & Weight", dimensions);

    let mut availability = Vec::new();
    if let Some(active) = flag(raw, "active") {
        availability.push(format!("- **Active:** {}", yes_no(active)));
    }
    if let Some(available) = flag(raw, "available") {
        availability.push(format!("- **Available:** {}", yes_no(available)));
    }
    let stock = number(raw, "stock");
    if let Some(stock) = stock {
        availability.push(format!("- **Stock:** {}", format_number(stock)));
    }
    if let Some(available_stock) = number(raw, "availableStock").filter(|s| Some(*s) != stock) {
        availability.push(format!("- **Available Stock:** {}", format_number(available_stock)));
    }
    if flag(raw, "isCloseout") == Some(true) {
        availability.push("- **Closeout:** Yes (sell until stock is 0)".to_string());
    }
    if flag(raw, "shippingFree") == Some(true) {
        availability.push("- **Shipping Free:** Yes".to_string());
    }
    if let Some(min) = number(raw, "minPurchase").filter(|m| *m > 1.0) {
        availability.push(format!("- **Minimum Purchase:** {}", format_number(min)));
    }
    if let Some(max) = number(raw, "maxPurchase") {
        availability.push(format!("- **Maximum Purchase:** {}", format_number(max)));
    }
    if let Some(steps) = number(raw, "purchaseSteps").filter(|s| *s > 1.0) {
        availability.push(format!("- **Purchase Steps:** {}", format_number(steps)));
    }
    push_section(&mut sections, "Availability & Stock", availability);

    if let Some(image) = extract_json_path(raw, "cover.media").and_then(media_image) {
        sections.push(format!("## Cover Image\n\n{}", image));
    }
    let gallery = list(raw, "media")
        .iter()
        .filter_map(|entry| entry.get("media").and_then(media_image))
        .map(|image| format!("- {}", image))
        .collect();
    push_section(&mut sections, "Product Images", gallery);

    let custom = extract_json_path(raw, "translated.customFields")
        .or_else(|| raw.get("customFields"))
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(key, value)| {
                    let rendered = match value {
                        Value::Null => return None,
                        Value::String(s) if s.is_empty() => return None,
                        Value::String(s) => s.clone(),
                        Value::Bool(b) => yes_no(*b).to_string(),
                        Value::Number(n) => n.to_string(),
                        other => other.to_string(),
                    };
                    Some(format!("- **{}:** {}", key, rendered))
                })
                .collect()
        })
        .unwrap_or_default();
    push_section(&mut sections, "Custom Fields", custom);

    let mut metadata = Vec::new();
    for (label, path) in [
        ("Release Date", "releaseDate"),
        ("Created", "createdAt"),
        ("Last Updated", "updatedAt"),
    ] {
        if let Some(value) = text(raw, path) {
            metadata.push(format!("- **{}:** {}", label, value));
        }
    }
    push_section(&mut sections, "Metadata", metadata);

    push_raw_data(&mut sections, raw);
    sections.join("\n\n")
}

fn list<'a>(raw: &'a Value, field: &str) -> &'a [Value] {
    raw.get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// `![alt](url)` for a media entity with a URL.
fn media_image(media: &Value) -> Option<String> {
    let url = text(media, "url")?;
    let alt = first_text(media, &["alt", "title", "fileName"])
        .unwrap_or_else(|| "Product image".to_string());
    Some(format!("![{}]({})", alt, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_endpoint() {
        assert_eq!(search_endpoint("/api/product"), "/api/search/product");
        assert_eq!(search_endpoint("/api/search/category"), "/api/search/category");
        assert_eq!(search_endpoint("/custom/product"), "/custom/product");
    }

    #[test]
    fn test_request_body_nests_associations() {
        let body = request_body(2, &["manufacturer".into(), "cover.media".into(), "cover".into()]);
        assert_eq!(
            body,
            json!({
                "page": 2,
                "limit": 50,
                "associations": {"manufacturer": {}, "cover": {"media": {}}}
            })
        );
        assert_eq!(request_body(1, &[]), json!({"page": 1, "limit": 50}));
    }

    #[test]
    fn test_product_is_rendered_from_translated_fields() {
        let raw = json!({
            "id": "0a1b",
            "name": "Desk",
            "translated": {"name": "Schreibtisch", "description": "<p>Solid oak</p>"},
            "productNumber": "SW-100",
            "manufacturer": {"translated": {"name": "Oakworks"}},
            "tax": {"taxRate": 19, "name": "Standard"},
            "price": [{"gross": 119, "net": 100}],
            "categories": [{"translated": {"breadcrumb": ["Home", "Office"]}}],
            "properties": [{"group": {"name": "Color"}, "name": "Natural"}],
            "stock": 5,
            "availableStock": 5,
            "active": true,
            "cover": {"media": {"url": "https://cdn.example.com/desk.jpg"}}
        });

        let item = map(&raw, "https://shop.example.com/");
        assert_eq!(item.title.as_deref(), Some("Schreibtisch"));
        assert_eq!(
            item.origin_uri.as_deref(),
            Some("https://shop.example.com/api/product/0a1b")
        );

        let content = item.content;
        assert!(content.starts_with("# Schreibtisch\n\n## Product Information\n\n"));
        assert!(content.contains("- **Product Number:** SW-100"));
        assert!(content.contains("- **Manufacturer:** Oakworks"));
        assert!(content.contains("- **Tax Rate:** 19% (Standard)"));
        assert!(content.contains("- **Gross Price:** 119.00 EUR"));
        assert!(content.contains("## Description\n\nSolid oak"));
        assert!(content.contains("- Home > Office"));
        assert!(content.contains("| Color | Natural |"));
        assert!(content.contains("- **Stock:** 5"));
        assert!(!content.contains("Available Stock"));
        assert!(content.contains("![Product image](https://cdn.example.com/desk.jpg)"));
        assert!(content.contains("## Raw Data\n\n```json"));
    }

    #[test]
    fn test_product_without_id_has_no_preset_identity() {
        let item = map(&json!({"name": "Loose"}), "https://shop.example.com");
        assert!(item.origin_uri.is_none());
        assert_eq!(item.title.as_deref(), Some("Loose"));
    }
}
