//! Random-access access to decrypted file content.
//!
//! A [`ContentResolver`] is handed to whatever needs to treat encrypted
//! files as seekable plaintext (a media player, a file server). It holds a
//! snapshot of the session's files and a copy of its key, and only ever
//! serves files of its own vault.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::debug;

use crate::session::VaultSession;
use crate::tree::FileNode;
use lifechest_common::{Error, Result, VaultId};
use lifechest_crypto::{decrypt_range, decrypt_range_into, Iv, VaultKey};
use lifechest_storage::{BlobReader, ContentStore};

/// Display metadata for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub display_name: String,
    pub size: u64,
    pub mime_type: String,
    pub date_added: DateTime<Utc>,
}

impl From<&FileNode> for FileInfo {
    fn from(node: &FileNode) -> Self {
        Self {
            display_name: node.name.clone(),
            size: node.size,
            mime_type: node.mime_type.clone(),
            date_added: node.import_date,
        }
    }
}

/// Per-session file lookup and opener.
pub struct ContentResolver {
    vault_id: VaultId,
    key: VaultKey,
    store: Arc<dyn ContentStore>,
    files: HashMap<String, FileNode>,
}

impl ContentResolver {
    pub(crate) fn new(session: &VaultSession) -> Result<Self> {
        let files = session
            .tree()?
            .list_files()
            .into_iter()
            .map(|file| (file.id().to_string(), file.clone()))
            .collect();

        Ok(Self {
            vault_id: session.vault_id().clone(),
            key: session.key()?.clone(),
            store: session.store().clone(),
            files,
        })
    }

    pub fn vault_id(&self) -> &VaultId {
        &self.vault_id
    }

    /// Display metadata of a file.
    pub fn query(&self, file_id: &str) -> Result<FileInfo> {
        self.file(file_id).map(FileInfo::from)
    }

    /// Open a seekable plaintext view of a file.
    ///
    /// # Errors
    /// - `NotPermitted` if `vault_id` is not this resolver's vault
    /// - `NotFound` if the file is unknown
    pub fn open(&self, vault_id: &VaultId, file_id: &str) -> Result<EncryptedFileHandle> {
        if vault_id != &self.vault_id {
            return Err(Error::NotPermitted(format!(
                "Resolver for vault {} cannot open files of vault {}",
                self.vault_id, vault_id
            )));
        }

        let blob = &self.file(file_id)?.attached_file;
        let size = blob.stored_len(self.store.as_ref())?;
        let reader = blob.open_ciphertext(self.store.as_ref())?;
        debug!(vault_id = %self.vault_id, blob_id = %blob.id, size, "Opened file handle");

        Ok(EncryptedFileHandle {
            reader: Some(reader),
            key: self.key.clone(),
            iv: blob.iv,
            size,
            position: 0,
        })
    }

    fn file(&self, file_id: &str) -> Result<&FileNode> {
        self.files
            .get(file_id)
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", file_id)))
    }
}

/// Seekable plaintext view over one ciphertext blob.
///
/// Every read decrypts only the requested bytes.
pub struct EncryptedFileHandle {
    reader: Option<Box<dyn BlobReader>>,
    key: VaultKey,
    iv: Iv,
    size: u64,
    position: u64,
}

impl EncryptedFileHandle {
    /// Plaintext size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Decrypt up to `length` bytes at `offset`. Shorter at end of file.
    pub fn read_range(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let remaining = usize::try_from(self.size.saturating_sub(offset)).unwrap_or(usize::MAX);
        let (reader, key, iv) = self.parts()?;
        decrypt_range(reader, key, iv, offset, length.min(remaining))
    }

    /// Decrypt into `buf` at `offset`, returning the number of bytes read.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let (reader, key, iv) = self.parts()?;
        decrypt_range_into(reader, key, iv, offset, buf)
    }

    /// Release the underlying blob. Later reads fail.
    pub fn close(&mut self) {
        self.reader = None;
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    fn parts(&mut self) -> Result<(&mut Box<dyn BlobReader>, &VaultKey, &Iv)> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::NotPermitted("File handle is closed".to_string()))?;
        Ok((reader, &self.key, &self.iv))
    }
}

impl Read for EncryptedFileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.read_at(self.position, buf).map_err(|e| match e {
            Error::Io(inner) => inner,
            other => io::Error::other(other),
        })?;
        self.position += read as u64;
        Ok(read)
    }
}

impl Seek for EncryptedFileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Seek to a negative position")
        })?;
        self.position = target;
        Ok(target)
    }
}
