//! Storage layer: a keyed JSON document store with in-memory and DuckDB
//! backends, and typed repositories on top.

mod document;
mod error;
mod memory;
mod repo;

pub use document::{Collection, DocumentStore};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use repo::{Repository, SummaryUpdate};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
