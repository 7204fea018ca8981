//! Collaborator implementations.
//!
//! Available backends:
//! - `MemoryCatalog` / `MemoryByteStorage` - in-memory (always available)
//! - `FsByteStorage` - files under a root directory (always available)
//! - `PostgresCatalog` - PostgreSQL catalog (requires `postgres` feature)

pub mod fs;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use fs::FsByteStorage;
pub use memory::{MemoryByteStorage, MemoryCatalog};

#[cfg(feature = "postgres")]
pub use postgres::PostgresCatalog;
