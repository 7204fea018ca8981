//! Generic crawler for paginated JSON APIs.
//!
//! Pages through a configured endpoint (page, offset, or cursor pagination),
//! extracts the item array at a dot path, and maps each item to a markdown
//! document with a stable origin URI. Shopware 6 and Weclapp presets fix the
//! request shape and rendering for those systems (see [`providers`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use api_crawler::{ApiAuth, ApiCrawlerClient, ApiCrawlerConfig, PaginationConfig};
//! use futures::StreamExt;
//!
//! let config = ApiCrawlerConfig::new("https://shop.example.com/api", "/products")
//!     .with_pagination(PaginationConfig::Page {
//!         page_param: "page".into(),
//!         page_size_param: "limit".into(),
//!         page_size: 100,
//!     })
//!     .with_data_path("data");
//!
//! let client = ApiCrawlerClient::new(config, ApiAuth::bearer("token"))?;
//! let mut items = client.stream_items();
//! while let Some(item) = items.next().await {
//!     let item = item?;
//!     println!("{}", item.title);
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod json_path;
pub mod mapping;
pub mod providers;

pub use client::{ApiAuth, ApiCrawlerClient};
pub use config::{
    ApiCrawlerConfig, ApiProvider, AuthType, FieldMapping, HttpMethod, PaginationConfig,
};
pub use error::{ApiCrawlerError, Result};
pub use mapping::ApiItem;
