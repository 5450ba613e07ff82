//! One-way hashing used for key derivation and key fingerprints.
//!
//! PIN and passphrase keys are the SHA-256 digest of the UTF-8 secret, so
//! the same secret always yields the same key. The digest of a key is its
//! fingerprint, which lets an importer check a recovered key without the
//! key itself ever being stored.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::keys::{VaultKey, KEY_LENGTH};
use lifechest_common::{Error, Result};

/// Digest size in bytes.
pub const HASH_LENGTH: usize = 32;

/// Hash arbitrary bytes with SHA-256.
pub fn hash(data: &[u8]) -> [u8; HASH_LENGTH] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; HASH_LENGTH];
    out.copy_from_slice(&digest);
    out
}

/// Derive a vault key from a low-entropy secret.
///
/// # Errors
/// - Returns error if the secret is empty
///
/// # Security
/// - The secret is not stored or logged
pub fn derive_key(secret: &[u8]) -> Result<VaultKey> {
    if secret.is_empty() {
        return Err(Error::InvalidInput("Secret cannot be empty".to_string()));
    }

    let digest = hash(secret);
    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(&digest[..KEY_LENGTH]);
    Ok(VaultKey::from_bytes(key))
}

/// Fingerprint of a key, safe to publish.
pub fn key_fingerprint(key: &VaultKey) -> [u8; HASH_LENGTH] {
    hash(key.as_bytes())
}

/// Check a key against a stored fingerprint in constant time.
pub fn verify_fingerprint(key: &VaultKey, expected: &[u8]) -> bool {
    if expected.len() != HASH_LENGTH {
        return false;
    }
    key_fingerprint(key)[..].ct_eq(expected).into()
}
