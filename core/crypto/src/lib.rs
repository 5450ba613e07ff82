//! Cryptographic primitives for Life Chest.
//!
//! This module provides:
//! - AES-256-CTR content encryption, whole-stream and chunked
//! - Counter arithmetic and random-access decryption of arbitrary byte ranges
//! - SHA-256 key derivation for PINs and passphrases, and key fingerprints
//! - HMAC-SHA256 integrity tags for the encrypted manifest
//! - Key wrapping with XChaCha20-Poly1305 for secure-element backed keys
//! - Random hex identifiers for vaults and blobs
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time comparison of key fingerprints

pub mod aead;
pub mod cipher;
pub mod counter;
pub mod ids;
pub mod kdf;
pub mod keys;
pub mod mac;
pub mod random_access;
pub mod stream;

pub use aead::{unwrap_key, wrap_key, WrappedKey};
pub use cipher::{decrypt_bytes, decrypt_utf8, encrypt_bytes, encrypt_utf8, CipherReader};
pub use counter::adjusted_iv;
pub use ids::{generate_id, is_valid_id, ID_LENGTH};
pub use kdf::{derive_key, hash, key_fingerprint, verify_fingerprint, HASH_LENGTH};
pub use keys::{Iv, VaultKey, BLOCK_SIZE, KEY_LENGTH};
pub use mac::TAG_LENGTH;
pub use random_access::{decrypt_range, decrypt_range_into};
pub use stream::{decrypt_stream, DecryptedChunks, EncryptingStream, DEFAULT_CHUNK_SIZE};
