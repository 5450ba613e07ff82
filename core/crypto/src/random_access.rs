//! Random-access decryption of counter-mode ciphertext.
//!
//! Reading `length` bytes at `offset` touches only the covering blocks:
//! the keystream starts at the counter for `offset / BLOCK_SIZE` and the
//! first `offset % BLOCK_SIZE` keystream bytes are discarded.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use ctr::cipher::StreamCipher;

use crate::cipher::new_cipher;
use crate::counter::{adjusted_iv, block_index};
use crate::keys::{Iv, VaultKey, BLOCK_SIZE};
use lifechest_common::Result;

/// Decrypt into `out` starting at plaintext `offset`.
///
/// Returns the number of bytes filled, which is short only when the
/// ciphertext ends before `out` is full.
pub fn decrypt_range_into<R: Read + Seek>(
    reader: &mut R,
    key: &VaultKey,
    iv: &Iv,
    offset: u64,
    out: &mut [u8],
) -> Result<usize> {
    if out.is_empty() {
        return Ok(0);
    }

    reader.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < out.len() {
        match reader.read(&mut out[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let mut cipher = new_cipher(key, &adjusted_iv(iv, block_index(offset)))?;
    let skip = (offset % BLOCK_SIZE as u64) as usize;
    if skip > 0 {
        let mut discard = [0u8; BLOCK_SIZE];
        cipher.apply_keystream(&mut discard[..skip]);
    }
    cipher.apply_keystream(&mut out[..filled]);

    Ok(filled)
}

/// Decrypt `length` bytes at `offset`, truncated at the end of the data.
///
/// The output buffer is sized from what remains after `offset`, so
/// open-ended requests such as `usize::MAX` are fine.
pub fn decrypt_range<R: Read + Seek>(
    reader: &mut R,
    key: &VaultKey,
    iv: &Iv,
    offset: u64,
    length: usize,
) -> Result<Vec<u8>> {
    let end = reader.seek(SeekFrom::End(0))?;
    let remaining = usize::try_from(end.saturating_sub(offset)).unwrap_or(usize::MAX);
    let mut out = vec![0u8; length.min(remaining)];
    let filled = decrypt_range_into(reader, key, iv, offset, &mut out)?;
    out.truncate(filled);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::encrypt_bytes;
    use crate::keys::KEY_LENGTH;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn key() -> VaultKey {
        VaultKey::from_bytes([9u8; KEY_LENGTH])
    }

    fn fixture(len: usize) -> (Iv, Vec<u8>, Cursor<Vec<u8>>) {
        let iv = Iv::generate();
        let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let ciphertext = encrypt_bytes(&key(), &iv, &plaintext).unwrap();
        (iv, plaintext, Cursor::new(ciphertext))
    }

    #[test]
    fn test_read_block_aligned_range_in_large_file() {
        let (iv, plaintext, mut reader) = fixture(5 * 1024 * 1024);

        let range = decrypt_range(&mut reader, &key(), &iv, 1_048_576, 4096).unwrap();

        assert_eq!(range.len(), 4096);
        assert_eq!(range, plaintext[1_048_576..1_048_576 + 4096]);
    }

    #[test]
    fn test_read_unaligned_range() {
        let (iv, plaintext, mut reader) = fixture(1000);

        for (offset, len) in [(1usize, 15usize), (15, 2), (17, 100), (333, 1)] {
            let range = decrypt_range(&mut reader, &key(), &iv, offset as u64, len).unwrap();
            assert_eq!(range, plaintext[offset..offset + len], "offset {}", offset);
        }
    }

    #[test]
    fn test_adjacent_ranges_concatenate() {
        let (iv, _, mut reader) = fixture(4096);

        let first = decrypt_range(&mut reader, &key(), &iv, 100, 250).unwrap();
        let second = decrypt_range(&mut reader, &key(), &iv, 350, 300).unwrap();
        let whole = decrypt_range(&mut reader, &key(), &iv, 100, 550).unwrap();

        assert_eq!([first, second].concat(), whole);
    }

    #[test]
    fn test_range_truncated_at_end() {
        let (iv, plaintext, mut reader) = fixture(100);

        let tail = decrypt_range(&mut reader, &key(), &iv, 90, 64).unwrap();
        assert_eq!(tail, plaintext[90..]);

        let past_end = decrypt_range(&mut reader, &key(), &iv, 500, 10).unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_open_ended_range_is_capped() {
        let (iv, plaintext, mut reader) = fixture(100);

        let tail = decrypt_range(&mut reader, &key(), &iv, 10, usize::MAX).unwrap();
        assert_eq!(tail.len(), 90);
        assert_eq!(tail, plaintext[10..]);

        let none = decrypt_range(&mut reader, &key(), &iv, u64::MAX, usize::MAX).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_empty_range() {
        let (iv, _, mut reader) = fixture(64);
        assert!(decrypt_range(&mut reader, &key(), &iv, 10, 0)
            .unwrap()
            .is_empty());
    }

    proptest! {
        #[test]
        fn prop_range_matches_full_decrypt(
            len in 1usize..3000,
            offset in 0usize..3000,
            length in 0usize..600,
        ) {
            let (iv, plaintext, mut reader) = fixture(len);
            let range = decrypt_range(&mut reader, &key(), &iv, offset as u64, length).unwrap();

            let start = offset.min(len);
            let end = (offset + length).min(len);
            prop_assert_eq!(range, plaintext[start..end].to_vec());
        }
    }
}
