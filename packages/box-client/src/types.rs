use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxItemType {
    File,
    Folder,
    WebLink,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxItem {
    #[serde(rename = "type")]
    pub item_type: BoxItemType,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_modified_at: Option<DateTime<Utc>>,
}

impl BoxItem {
    /// Content modification time, falling back to the item's own modification time.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.content_modified_at.or(self.modified_at)
    }
}

/// One page of `GET /folders/{id}/items`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxFolderItems {
    pub entries: Vec<BoxItem>,
    pub total_count: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}
