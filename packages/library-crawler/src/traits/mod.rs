//! Collaborator interfaces consumed by the crawl core.
//!
//! - `Catalog`: relational file, audit, and run records
//! - `ByteStorage`: persistence of file bytes by computed path

pub mod catalog;
pub mod storage;

pub use catalog::Catalog;
pub use storage::ByteStorage;
