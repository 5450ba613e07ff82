//! Vault engine for Life Chest.
//!
//! This module provides:
//! - Vault creation, listing, unlocking and deletion
//! - The encrypted file tree (manifest) and its persistence
//! - Pluggable unlock mechanisms (password, PIN, secure element)
//! - Encrypted file and directory operations
//! - Random-access reads for media playback
//!
//! # Architecture
//! The vault module sits between the user interface and the content
//! store, handling all encryption/decryption operations transparently.

pub mod blob;
pub mod config;
pub mod manager;
pub mod operations;
pub mod reader;
pub mod session;
pub mod sort;
pub mod tree;
pub mod unlock;

pub use blob::EncryptedBlobRef;
pub use config::{EncryptionLevel, VaultConfig, CONFIG_FILENAME};
pub use manager::{VaultManager, VaultPolicy};
pub use operations::{FileImport, VaultOperations};
pub use reader::{ContentResolver, EncryptedFileHandle, FileInfo};
pub use session::{BackgroundAction, ForegroundAction, SessionHandle, VaultSession, VaultState};
pub use sort::SortMethod;
pub use tree::{DirectoryNode, FileNode, FileTree, TreeNode};
pub use unlock::{
    CredentialPurpose, CredentialRequest, CredentialSource, SecureElement, SoftwareSecureElement,
    StaticCredentials, UnlockContext, UnlockMechanism,
};
