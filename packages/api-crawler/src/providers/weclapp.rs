//! Weclapp ERP articles (`GET /webapp/api/v1/article?page=&pageSize=`).

use serde_json::Value;

use super::{
    base, flag, format_number, format_price, item_id, number, push_raw_data, push_section, text,
    yes_no, PresetItem,
};

pub const PAGE_SIZE: u32 = 100;

fn title(raw: &Value) -> Option<String> {
    text(raw, "name").or_else(|| text(raw, "articleNumber").map(|n| format!("Article {}", n)))
}

pub(super) fn map(raw: &Value, base_url: &str) -> PresetItem {
    let title = title(raw);
    let origin_uri =
        item_id(raw).map(|id| format!("{}/webapp/api/v1/article/id/{}", base(base_url), id));
    let content = render(raw, title.as_deref().unwrap_or("Article"));
    PresetItem {
        title,
        origin_uri,
        content,
    }
}

fn render(raw: &Value, title: &str) -> String {
    let mut sections = vec![format!("# {}", title)];

    let mut header = Vec::new();
    for (label, path) in [
        ("Article Number", "articleNumber"),
        ("EAN", "ean"),
        ("Manufacturer Part Number", "manufacturerPartNumber"),
    ] {
        if let Some(value) = text(raw, path) {
            header.push(format!("**{}:** {}", label, value));
        }
    }
    if let Some(unit) = text(raw, "unit.name").or_else(|| text(raw, "unitName")) {
        header.push(format!("**Unit:** {}", unit));
    }
    if !header.is_empty() {
        sections.push(header.join("\n"));
    }

    if let Some(description) = text(raw, "description") {
        sections.push(format!("## Description\n\n{}", description));
    }
    if let Some(details) = text(raw, "longDescription") {
        sections.push(format!("## Details\n\n{}", details));
    }

    let mut pricing = Vec::new();
    if let Some(price) = number(raw, "salesPrice") {
        pricing.push(format!("- **Sales Price:** {} EUR", format_price(price)));
    }
    if let Some(price) = number(raw, "purchasePrice") {
        pricing.push(format!("- **Purchase Price:** {} EUR", format_price(price)));
    }
    push_section(&mut sections, "Pricing", pricing);

    let price_list = raw
        .get("articlePrices")
        .and_then(Value::as_array)
        .map(|prices| {
            prices
                .iter()
                .filter_map(|entry| {
                    let price = number(entry, "price")?;
                    let scale = text(entry, "priceScaleType")
                        .map(|s| format!(" ({})", s))
                        .unwrap_or_default();
                    Some(format!("- {} EUR{}", format_price(price), scale))
                })
                .collect()
        })
        .unwrap_or_default();
    push_section(&mut sections, "Price List", price_list);

    let mut stock = Vec::new();
    if let Some(available) = number(raw, "availableStock") {
        stock.push(format!("- **Available Stock:** {}", format_number(available)));
    }
    if let Some(level) = number(raw, "stockWarningLevel") {
        stock.push(format!("- **Warning Level:** {}", format_number(level)));
    }
    push_section(&mut sections, "Stock", stock);

    let category = text(raw, "articleCategory.name").or_else(|| {
        text(raw, "articleCategoryId").map(|id| format!("Category ID: {}", id))
    });
    if let Some(category) = category {
        sections.push(format!("## Category\n\n{}", category));
    }

    let attributes = raw
        .get("customAttributes")
        .and_then(Value::as_array)
        .map(|attributes| {
            attributes
                .iter()
                .filter_map(|attribute| {
                    let value = ["stringValue", "numberValue", "dateValue"]
                        .iter()
                        .find_map(|field| text(attribute, field))
                        .or_else(|| {
                            flag(attribute, "booleanValue").map(|b| yes_no(b).to_string())
                        })?;
                    let id = text(attribute, "attributeDefinitionId").unwrap_or_default();
                    Some(format!("- {}: {}", id, value))
                })
                .collect()
        })
        .unwrap_or_default();
    push_section(&mut sections, "Custom Attributes", attributes);

    if let Some(active) = flag(raw, "active") {
        sections.push(format!("## Status\n\n- **Active:** {}", yes_no(active)));
    }

    push_raw_data(&mut sections, raw);
    sections.join("\n\n")
}
