//! AES-256-CTR primitives.
//!
//! Counter mode turns AES into a stream cipher: ciphertext has the same
//! length as plaintext, encryption and decryption are the same keystream
//! XOR, and any block can be reached by advancing the counter. The
//! single-shot helpers take a caller-supplied IV because the metadata they
//! protect (file names, the manifest) keeps its IV elsewhere.

use std::io::{self, Read};

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::keys::{Iv, VaultKey};
use lifechest_common::{Error, Result};

/// AES-256 with a 128-bit big-endian counter.
pub(crate) type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Initialize a keystream for `key` starting at counter block `iv`.
pub(crate) fn new_cipher(key: &VaultKey, iv: &Iv) -> Result<Aes256Ctr> {
    Aes256Ctr::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| Error::Crypto(format!("Cipher initialization failed: {}", e)))
}

/// Encrypt a small buffer in one call.
pub fn encrypt_bytes(key: &VaultKey, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = plaintext.to_vec();
    new_cipher(key, iv)?.apply_keystream(&mut buffer);
    Ok(buffer)
}

/// Decrypt a small buffer in one call.
pub fn decrypt_bytes(key: &VaultKey, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = ciphertext.to_vec();
    new_cipher(key, iv)?.apply_keystream(&mut buffer);
    Ok(buffer)
}

/// Encrypt a UTF-8 string.
pub fn encrypt_utf8(key: &VaultKey, iv: &Iv, text: &str) -> Result<Vec<u8>> {
    encrypt_bytes(key, iv, text.as_bytes())
}

/// Decrypt into a UTF-8 string.
///
/// # Errors
/// - Returns error if the plaintext is not valid UTF-8, which in practice
///   means the key or IV is wrong
pub fn decrypt_utf8(key: &VaultKey, iv: &Iv, ciphertext: &[u8]) -> Result<String> {
    let plaintext = decrypt_bytes(key, iv, ciphertext)?;
    String::from_utf8(plaintext)
        .map_err(|_| Error::Crypto("Decrypted text is not valid UTF-8".to_string()))
}

/// Reader adapter that applies the keystream to everything read through it.
///
/// Wrapping a ciphertext reader yields plaintext and vice versa. Chaining
/// two of them re-keys a stream in a single pass.
pub struct CipherReader<R> {
    inner: R,
    cipher: Aes256Ctr,
}

impl<R: Read> CipherReader<R> {
    /// Wrap `inner`, starting the keystream at `iv`.
    pub fn new(inner: R, key: &VaultKey, iv: &Iv) -> Result<Self> {
        Ok(Self {
            inner,
            cipher: new_cipher(key, iv)?,
        })
    }

    /// Give back the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;

    fn key() -> VaultKey {
        VaultKey::from_bytes([42u8; KEY_LENGTH])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let iv = Iv::generate();
        let plaintext = b"Hello, World!";

        let ciphertext = encrypt_bytes(&key(), &iv, plaintext).unwrap();
        let decrypted = decrypt_bytes(&key(), &iv, &ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ciphertext_size_matches_plaintext() {
        let iv = Iv::generate();
        let ciphertext = encrypt_bytes(&key(), &iv, b"Test message").unwrap();

        assert_eq!(ciphertext.len(), b"Test message".len());
    }

    #[test]
    fn test_same_iv_is_deterministic() {
        let iv = Iv::from_bytes([1u8; 16]);

        let ct1 = encrypt_utf8(&key(), &iv, "photo.jpg").unwrap();
        let ct2 = encrypt_utf8(&key(), &iv, "photo.jpg").unwrap();

        assert_eq!(ct1, ct2);
        assert_eq!(decrypt_utf8(&key(), &iv, &ct1).unwrap(), "photo.jpg");
    }

    #[test]
    fn test_different_iv_changes_ciphertext() {
        let ct1 = encrypt_bytes(&key(), &Iv::generate(), b"Same plaintext").unwrap();
        let ct2 = encrypt_bytes(&key(), &Iv::generate(), b"Same plaintext").unwrap();

        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key_does_not_recover_plaintext() {
        let iv = Iv::generate();
        let other = VaultKey::from_bytes([2u8; KEY_LENGTH]);
        let ciphertext = encrypt_bytes(&key(), &iv, b"Secret data").unwrap();

        assert_ne!(decrypt_bytes(&other, &iv, &ciphertext).unwrap(), b"Secret data");
    }

    #[test]
    fn test_empty_plaintext() {
        let iv = Iv::generate();
        let ciphertext = encrypt_bytes(&key(), &iv, b"").unwrap();

        assert!(ciphertext.is_empty());
        assert_eq!(decrypt_utf8(&key(), &iv, &ciphertext).unwrap(), "");
    }

    #[test]
    fn test_cipher_reader_rekeys_in_one_pass() {
        let source_key = key();
        let dest_key = VaultKey::from_bytes([9u8; KEY_LENGTH]);
        let source_iv = Iv::generate();
        let dest_iv = Iv::generate();
        let plaintext = vec![0x5au8; 10_000];

        let source_ct = encrypt_bytes(&source_key, &source_iv, &plaintext).unwrap();

        let decrypting = CipherReader::new(&source_ct[..], &source_key, &source_iv).unwrap();
        let mut reencrypting = CipherReader::new(decrypting, &dest_key, &dest_iv).unwrap();
        let mut dest_ct = Vec::new();
        reencrypting.read_to_end(&mut dest_ct).unwrap();

        assert_eq!(decrypt_bytes(&dest_key, &dest_iv, &dest_ct).unwrap(), plaintext);
    }
}
