//! Keyed integrity tags for sealed metadata.
//!
//! Counter mode alone does not detect tampering, so the manifest carries an
//! HMAC-SHA256 tag over its ciphertext. The MAC key is derived from the
//! vault key with HKDF and a fixed info string, so the vault key itself is
//! never used for two purposes.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::keys::{VaultKey, KEY_LENGTH};
use lifechest_common::{Error, Result};

/// Tag size in bytes.
pub const TAG_LENGTH: usize = 32;

const MANIFEST_MAC_INFO: &[u8] = b"lifechest manifest mac v1";

fn mac_key(key: &VaultKey) -> Result<Zeroizing<[u8; KEY_LENGTH]>> {
    let hkdf = Hkdf::<Sha256>::new(None, key.as_bytes());
    let mut okm = Zeroizing::new([0u8; KEY_LENGTH]);
    hkdf.expand(MANIFEST_MAC_INFO, &mut okm[..])
        .map_err(|e| Error::Crypto(format!("HKDF expand failed: {}", e)))?;
    Ok(okm)
}

fn new_mac(key: &VaultKey) -> Result<Hmac<Sha256>> {
    let mac_key = mac_key(key)?;
    <Hmac<Sha256> as Mac>::new_from_slice(&mac_key[..])
        .map_err(|e| Error::Crypto(format!("Invalid MAC key: {}", e)))
}

/// Append a tag to `ciphertext`.
pub fn seal(key: &VaultKey, mut ciphertext: Vec<u8>) -> Result<Vec<u8>> {
    let mut mac = new_mac(key)?;
    mac.update(&ciphertext);
    ciphertext.extend_from_slice(&mac.finalize().into_bytes());
    Ok(ciphertext)
}

/// Check and strip the tag appended by [`seal`].
///
/// # Errors
/// - `Credential` if the data is too short or the tag does not match,
///   which covers both a wrong key and tampered data
pub fn open<'a>(key: &VaultKey, sealed: &'a [u8]) -> Result<&'a [u8]> {
    let split = sealed
        .len()
        .checked_sub(TAG_LENGTH)
        .ok_or_else(|| Error::Credential("Sealed data is too short".to_string()))?;
    let (ciphertext, tag) = sealed.split_at(split);

    let mut mac = new_mac(key)?;
    mac.update(ciphertext);
    mac.verify_slice(tag)
        .map_err(|_| Error::Credential("Integrity check failed".to_string()))?;
    Ok(ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_then_open() {
        let key = VaultKey::generate();
        let sealed = seal(&key, b"manifest".to_vec()).unwrap();

        assert_eq!(sealed.len(), 8 + TAG_LENGTH);
        assert_eq!(open(&key, &sealed).unwrap(), b"manifest");
    }

    #[test]
    fn test_any_flipped_byte_is_rejected() {
        let key = VaultKey::generate();
        let sealed = seal(&key, vec![7u8; 64]).unwrap();

        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert!(
                matches!(open(&key, &tampered), Err(Error::Credential(_))),
                "byte {}",
                i
            );
        }
    }

    #[test]
    fn test_wrong_key_and_short_input() {
        let sealed = seal(&VaultKey::generate(), Vec::new()).unwrap();

        assert!(open(&VaultKey::generate(), &sealed).is_err());
        assert!(matches!(
            open(&VaultKey::generate(), &[0u8; 5]),
            Err(Error::Credential(_))
        ));
    }
}
