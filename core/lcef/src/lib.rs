//! LCEF exchange containers for Life Chest.
//!
//! An LCEF container moves one encrypted file between vaults with
//! different keys. The body ciphertext travels unchanged; the header
//! carries what the recipient needs to rerun the source vault's unlock
//! mechanism and check the recovered key against a fingerprint.

pub mod export;
pub mod format;
pub mod import;

pub use export::export_file;
pub use format::{
    is_lcef, read_header, write_header, FileMetadata, LcefHeader, EXTENSION, MAGIC, MIME_TYPE,
    VERSION,
};
pub use import::{import_containers, Container};
