//! References to ciphertext blobs in the content store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

use lifechest_common::{Result, VaultId};
use lifechest_crypto::{
    decrypt_range, generate_id, DecryptedChunks, EncryptingStream, Iv, VaultKey,
};
use lifechest_storage::{BlobReader, ContentStore};

/// Description of one ciphertext blob.
///
/// `(vault_id, id)` names exactly one blob in the store. The IV is fresh
/// for every blob and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlobRef {
    pub id: String,
    #[serde(rename = "vaultID")]
    pub vault_id: VaultId,
    pub iv: Iv,
    /// Date of the original content.
    pub creation_date: DateTime<Utc>,
    /// When the content entered the vault.
    pub import_date: DateTime<Utc>,
}

impl EncryptedBlobRef {
    /// Encrypt everything `reader` yields into a new blob.
    ///
    /// The blob only becomes visible once fully written, so a failure
    /// midway leaves nothing behind.
    ///
    /// # Returns
    /// The new reference and the plaintext size.
    pub fn encrypt_from<R: Read>(
        store: &dyn ContentStore,
        vault_id: &VaultId,
        key: &VaultKey,
        reader: R,
        creation_date: DateTime<Utc>,
    ) -> Result<(Self, u64)> {
        let id = generate_id();
        let iv = Iv::generate();

        let mut writer = store.create_blob(vault_id, &id)?;
        let size = EncryptingStream::new(key, iv).encrypt_stream(reader, &mut writer)?;
        writer.commit()?;

        debug!(vault_id = %vault_id, blob_id = %id, size, "Blob written");
        Ok((
            Self {
                id,
                vault_id: vault_id.clone(),
                iv,
                creation_date,
                import_date: Utc::now(),
            },
            size,
        ))
    }

    /// Open the raw ciphertext.
    pub fn open_ciphertext(&self, store: &dyn ContentStore) -> Result<Box<dyn BlobReader>> {
        store.open_blob(&self.vault_id, &self.id)
    }

    /// Length of the blob, equal to the plaintext length.
    pub fn stored_len(&self, store: &dyn ContentStore) -> Result<u64> {
        store.blob_len(&self.vault_id, &self.id)
    }

    /// Lazily decrypt the blob chunk by chunk.
    pub fn chunks(
        &self,
        store: &dyn ContentStore,
        key: &VaultKey,
    ) -> Result<DecryptedChunks<Box<dyn BlobReader>>> {
        DecryptedChunks::new(self.open_ciphertext(store)?, key, &self.iv)
    }

    /// Decrypt the whole blob into `writer`.
    pub fn decrypt_to<W: Write>(
        &self,
        store: &dyn ContentStore,
        key: &VaultKey,
        mut writer: W,
    ) -> Result<u64> {
        let mut written = 0u64;
        for chunk in self.chunks(store, key)? {
            let chunk = chunk?;
            writer.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        writer.flush()?;
        Ok(written)
    }

    /// Decrypt the whole blob into memory.
    pub fn decrypt_to_vec(&self, store: &dyn ContentStore, key: &VaultKey) -> Result<Vec<u8>> {
        self.chunks(store, key)?.collect_bytes()
    }

    /// Decrypt `length` bytes at `offset` without touching the rest.
    pub fn decrypt_random_access(
        &self,
        store: &dyn ContentStore,
        key: &VaultKey,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>> {
        let mut reader = self.open_ciphertext(store)?;
        decrypt_range(&mut reader, key, &self.iv, offset, length)
    }

    /// Remove the blob from the store.
    pub fn delete(&self, store: &dyn ContentStore) -> Result<()> {
        store.delete_blob(&self.vault_id, &self.id)
    }
}
