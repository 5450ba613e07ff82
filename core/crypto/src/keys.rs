//! Key and IV types with secure memory handling.
//!
//! Vault keys automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use lifechest_common::{encoding, Error, Result};

/// Length of vault keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Cipher block size in bytes. IVs are exactly one block.
pub const BLOCK_SIZE: usize = 16;

/// Symmetric key protecting one vault.
///
/// Every unlock mechanism normalizes its output to this type, so the
/// rest of the engine never cares how the key was obtained.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; KEY_LENGTH],
}

impl VaultKey {
    /// Create a vault key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a vault key from a slice.
    ///
    /// # Errors
    /// - Returns error if the slice is not exactly KEY_LENGTH bytes
    pub fn from_slice(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = key.try_into().map_err(|_| {
            Error::Crypto(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                key.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Generate a random vault key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl PartialEq for VaultKey {
    fn eq(&self, other: &Self) -> bool {
        self.key[..].ct_eq(&other.key[..]).into()
    }
}

impl Eq for VaultKey {}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultKey([REDACTED])")
    }
}

/// Initialization vector, also the initial counter block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Iv([u8; BLOCK_SIZE]);

impl Iv {
    /// Generate a fresh random IV.
    pub fn generate() -> Self {
        let mut iv = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        Self(iv)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, failing on any length but BLOCK_SIZE.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let iv: [u8; BLOCK_SIZE] = bytes.try_into().map_err(|_| {
            Error::Crypto(format!(
                "Invalid IV length: expected {}, got {}",
                BLOCK_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(iv))
    }

    /// Get the IV bytes.
    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", encoding::encode(&self.0))
    }
}

impl Serialize for Iv {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&encoding::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Iv {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = encoding::decode(&text).map_err(de::Error::custom)?;
        Iv::from_slice(&bytes).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_key_generate() {
        let key1 = VaultKey::generate();
        let key2 = VaultKey::generate();

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_vault_key_from_slice_length() {
        assert!(VaultKey::from_slice(&[0u8; 16]).is_err());
        assert!(VaultKey::from_slice(&[7u8; KEY_LENGTH]).is_ok());
    }

    #[test]
    fn test_vault_key_debug_redacted() {
        let key = VaultKey::from_bytes([1u8; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "VaultKey([REDACTED])");
    }

    #[test]
    fn test_iv_generate() {
        assert_ne!(Iv::generate(), Iv::generate());
    }

    #[test]
    fn test_iv_rejects_malformed_length() {
        assert!(Iv::from_slice(&[0u8; 12]).is_err());
        assert!(Iv::from_slice(&[0u8; 17]).is_err());
    }

    #[test]
    fn test_iv_json_is_base64() {
        let iv = Iv::from_bytes([0u8; BLOCK_SIZE]);
        let json = serde_json::to_string(&iv).unwrap();
        assert_eq!(json, "\"AAAAAAAAAAAAAAAAAAAAAA==\"");
        assert_eq!(serde_json::from_str::<Iv>(&json).unwrap(), iv);
        assert!(serde_json::from_str::<Iv>("\"AAAA\"").is_err());
    }
}
