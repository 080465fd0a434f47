//! Catalog database module

pub mod operations;
pub mod schema;

// Re-export for convenience
pub use operations::{CatalogEntry, CatalogStore};
pub use schema::{database_url, initialize_database, MEMORY_DB};
