//! mnemos-core - Core library for Mnemos
//!
//! This crate provides the durable half of the memory layer:
//!
//! - **types**: Memory items, embeddings, topics, links and events
//! - **db**: Direct SQLite database access (the MemoryStore)
//! - **error**: Error taxonomy shared by the store operations
//!
//! Everything here is synchronous. The async services (indexing,
//! clustering, retrieval, caching) live in `mnemos-sdk` and call into
//! [`Database`] through an `Arc`.

pub mod db;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use db::Database;
pub use error::{Error, Result};
