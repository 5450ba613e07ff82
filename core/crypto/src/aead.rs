//! Key wrapping with XChaCha20-Poly1305.
//!
//! Used where a vault key has to rest on disk protected by another key,
//! as with hardware-backed unlock. The 24-byte nonce is safe for random
//! generation, and the Poly1305 tag makes a wrong wrapping key fail loudly
//! instead of producing a garbage vault key.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};

use crate::keys::VaultKey;
use lifechest_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// A vault key sealed under a key-encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// Sealed key followed by the authentication tag.
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

impl WrappedKey {
    /// Rebuild from stored parts.
    ///
    /// # Errors
    /// - Returns error if the nonce is not NONCE_SIZE bytes
    pub fn from_parts(ciphertext: Vec<u8>, nonce: &[u8]) -> Result<Self> {
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| {
            Error::Crypto(format!(
                "Invalid nonce length: expected {}, got {}",
                NONCE_SIZE,
                nonce.len()
            ))
        })?;
        Ok(Self { ciphertext, nonce })
    }
}

/// Seal `key` under `kek` with a fresh random nonce.
pub fn wrap_key(kek: &VaultKey, key: &VaultKey) -> Result<WrappedKey> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(kek.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, &key.as_bytes()[..])
        .map_err(|e| Error::Crypto(format!("Key wrapping failed: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(&nonce);
    Ok(WrappedKey {
        ciphertext,
        nonce: nonce_bytes,
    })
}

/// Open a wrapped key.
///
/// # Errors
/// - Returns error if authentication fails (wrong kek or tampered data)
/// - Returns error if the unwrapped key has the wrong length
pub fn unwrap_key(kek: &VaultKey, wrapped: &WrappedKey) -> Result<VaultKey> {
    if wrapped.ciphertext.len() < TAG_SIZE {
        return Err(Error::Crypto("Wrapped key too short".to_string()));
    }

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(kek.as_bytes()));
    let mut plaintext = cipher
        .decrypt(GenericArray::from_slice(&wrapped.nonce), wrapped.ciphertext.as_slice())
        .map_err(|e| Error::Crypto(format!("Key unwrapping failed: {}", e)))?;

    let key = VaultKey::from_slice(&plaintext);
    zeroize::Zeroize::zeroize(&mut plaintext);
    key
}
