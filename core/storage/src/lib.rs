//! Content store abstraction for Life Chest.
//!
//! A content store keeps, per vault, a flat set of write-once ciphertext
//! blobs plus a handful of metadata files. It knows nothing about keys or
//! the file tree; those live in the vault crate.
//!
//! # Design Principles
//! - Store isolation: no store-specific logic in vault or crypto modules
//! - Streaming: blobs are written through `Write` and read through `Read + Seek`
//! - Write-once blobs: an id is never overwritten, only deleted
//! - Unified error semantics: consistent error types across stores

pub mod local;
pub mod memory;
pub mod store;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use store::{BlobReader, BlobWriter, ContentStore};
