//! Streaming encryption for large files.
//!
//! Data is processed in fixed-size chunks so memory use is bounded by the
//! chunk size, never by the file size. Counter mode needs no padding and
//! no trailer, so finishing a stream is just the last chunk.

use std::io::{ErrorKind, Read, Write};
use std::iter::FusedIterator;

use ctr::cipher::StreamCipher;

use crate::cipher::{new_cipher, Aes256Ctr};
use crate::keys::{Iv, VaultKey};
use lifechest_common::Result;

/// Default chunk size for streaming (8 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Encrypting stream that processes data in chunks.
pub struct EncryptingStream<'a> {
    key: &'a VaultKey,
    iv: Iv,
    chunk_size: usize,
}

impl<'a> EncryptingStream<'a> {
    /// Create a new encrypting stream starting its keystream at `iv`.
    pub fn new(key: &'a VaultKey, iv: Iv) -> Self {
        Self {
            key,
            iv,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set custom chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Encrypt data from reader and write to writer.
    ///
    /// # Postconditions
    /// - Writer received exactly as many bytes as were read
    /// - Returns the number of plaintext bytes processed
    ///
    /// # Errors
    /// - I/O errors from reader/writer; bytes already written stay written
    pub fn encrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let mut cipher = new_cipher(self.key, &self.iv)?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            cipher.apply_keystream(&mut buffer[..bytes_read]);
            writer.write_all(&buffer[..bytes_read])?;
            total_bytes += bytes_read as u64;
        }

        writer.flush()?;
        Ok(total_bytes)
    }
}

/// Lazy, forward-only sequence of decrypted chunks.
///
/// Each call to `next` reads at most one chunk of ciphertext. The sequence
/// is single-pass: once it yields `None` or an error it stays exhausted,
/// and the underlying reader (usually an open file) is released at that
/// point. Dropping the iterator early releases it as well.
pub struct DecryptedChunks<R> {
    reader: Option<R>,
    cipher: Aes256Ctr,
    chunk_size: usize,
}

impl<R: Read> DecryptedChunks<R> {
    /// Start decrypting `reader` with the keystream at `iv`.
    pub fn new(reader: R, key: &VaultKey, iv: &Iv) -> Result<Self> {
        Ok(Self {
            reader: Some(reader),
            cipher: new_cipher(key, iv)?,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Set custom chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Drain the remaining chunks into one buffer.
    pub fn collect_bytes(self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in self {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl<R: Read> Iterator for DecryptedChunks<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let mut chunk = vec![0u8; self.chunk_size];

        let bytes_read = loop {
            match reader.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e.into()));
                }
            }
        };

        if bytes_read == 0 {
            self.reader = None;
            return None;
        }

        chunk.truncate(bytes_read);
        self.cipher.apply_keystream(&mut chunk);
        Some(Ok(chunk))
    }
}

impl<R: Read> FusedIterator for DecryptedChunks<R> {}

/// Decrypt data from reader and write to writer.
///
/// Returns the number of plaintext bytes written.
pub fn decrypt_stream<R: Read, W: Write>(
    reader: R,
    mut writer: W,
    key: &VaultKey,
    iv: &Iv,
) -> Result<u64> {
    let mut total_bytes = 0u64;
    for chunk in DecryptedChunks::new(reader, key, iv)? {
        let chunk = chunk?;
        writer.write_all(&chunk)?;
        total_bytes += chunk.len() as u64;
    }
    writer.flush()?;
    Ok(total_bytes)
}
