//! In-memory content store for testing.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::store::{check_blob_id, check_metadata_name, BlobReader, BlobWriter, ContentStore};
use lifechest_common::{Error, Result, VaultId};

#[derive(Debug, Default, Clone)]
struct VaultEntry {
    blobs: BTreeMap<String, Arc<Vec<u8>>>,
    metadata: HashMap<String, Vec<u8>>,
}

type Vaults = HashMap<VaultId, VaultEntry>;

/// In-memory content store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Readers see a snapshot taken when they were opened.
#[derive(Clone, Default)]
pub struct MemoryStore {
    storage: Arc<RwLock<Vaults>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vaults>> {
        read_lock(&self.storage)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vaults>> {
        write_lock(&self.storage)
    }
}

fn read_lock(storage: &RwLock<Vaults>) -> Result<RwLockReadGuard<'_, Vaults>> {
    storage
        .read()
        .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
}

fn write_lock(storage: &RwLock<Vaults>) -> Result<RwLockWriteGuard<'_, Vaults>> {
    storage
        .write()
        .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
}

fn vault_not_found(vault: &VaultId) -> Error {
    Error::NotFound(format!("Vault not found: {}", vault))
}

fn blob_not_found(blob_id: &str) -> Error {
    Error::NotFound(format!("Blob not found: {}", blob_id))
}

impl ContentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn create_vault_dir(&self, vault: &VaultId) -> Result<()> {
        let mut storage = self.write()?;
        if storage.contains_key(vault) {
            return Err(Error::AlreadyExists(format!("Vault already exists: {}", vault)));
        }
        storage.insert(vault.clone(), VaultEntry::default());
        Ok(())
    }

    fn delete_vault_dir(&self, vault: &VaultId) -> Result<()> {
        self.write()?
            .remove(vault)
            .map(|_| ())
            .ok_or_else(|| vault_not_found(vault))
    }

    fn vault_exists(&self, vault: &VaultId) -> Result<bool> {
        Ok(self.read()?.contains_key(vault))
    }

    fn list_vaults(&self) -> Result<Vec<VaultId>> {
        let mut vaults: Vec<VaultId> = self.read()?.keys().cloned().collect();
        vaults.sort();
        Ok(vaults)
    }

    fn create_blob(&self, vault: &VaultId, blob_id: &str) -> Result<Box<dyn BlobWriter>> {
        check_blob_id(blob_id)?;
        let storage = self.read()?;
        let entry = storage.get(vault).ok_or_else(|| vault_not_found(vault))?;
        if entry.blobs.contains_key(blob_id) {
            return Err(Error::AlreadyExists(format!("Blob already exists: {}", blob_id)));
        }

        Ok(Box::new(MemoryBlobWriter {
            storage: Arc::clone(&self.storage),
            vault: vault.clone(),
            blob_id: blob_id.to_string(),
            buffer: Vec::new(),
        }))
    }

    fn open_blob(&self, vault: &VaultId, blob_id: &str) -> Result<Box<dyn BlobReader>> {
        check_blob_id(blob_id)?;
        let storage = self.read()?;
        let entry = storage.get(vault).ok_or_else(|| vault_not_found(vault))?;
        let data = entry
            .blobs
            .get(blob_id)
            .ok_or_else(|| blob_not_found(blob_id))?;
        Ok(Box::new(Cursor::new(SharedBytes(Arc::clone(data)))))
    }

    fn blob_len(&self, vault: &VaultId, blob_id: &str) -> Result<u64> {
        let storage = self.read()?;
        let entry = storage.get(vault).ok_or_else(|| vault_not_found(vault))?;
        entry
            .blobs
            .get(blob_id)
            .map(|data| data.len() as u64)
            .ok_or_else(|| blob_not_found(blob_id))
    }

    fn blob_exists(&self, vault: &VaultId, blob_id: &str) -> Result<bool> {
        let storage = self.read()?;
        let entry = storage.get(vault).ok_or_else(|| vault_not_found(vault))?;
        Ok(entry.blobs.contains_key(blob_id))
    }

    fn delete_blob(&self, vault: &VaultId, blob_id: &str) -> Result<()> {
        let mut storage = self.write()?;
        let entry = storage.get_mut(vault).ok_or_else(|| vault_not_found(vault))?;
        entry
            .blobs
            .remove(blob_id)
            .map(|_| ())
            .ok_or_else(|| blob_not_found(blob_id))
    }

    fn list_blobs(&self, vault: &VaultId) -> Result<Vec<String>> {
        let storage = self.read()?;
        let entry = storage.get(vault).ok_or_else(|| vault_not_found(vault))?;
        Ok(entry.blobs.keys().cloned().collect())
    }

    fn read_metadata(&self, vault: &VaultId, name: &str) -> Result<Vec<u8>> {
        check_metadata_name(name)?;
        let storage = self.read()?;
        let entry = storage.get(vault).ok_or_else(|| vault_not_found(vault))?;
        entry
            .metadata
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Metadata not found: {}", name)))
    }

    fn write_metadata(&self, vault: &VaultId, name: &str, data: &[u8]) -> Result<()> {
        check_metadata_name(name)?;
        let mut storage = self.write()?;
        let entry = storage.get_mut(vault).ok_or_else(|| vault_not_found(vault))?;
        entry.metadata.insert(name.to_string(), data.to_vec());
        Ok(())
    }
}

/// Committed blob bytes shared between the store and open readers.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

struct MemoryBlobWriter {
    storage: Arc<RwLock<Vaults>>,
    vault: VaultId,
    blob_id: String,
    buffer: Vec<u8>,
}

impl Write for MemoryBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemoryBlobWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryBlobWriter {
            storage,
            vault,
            blob_id,
            buffer,
        } = *self;

        let mut storage = write_lock(&storage)?;
        let entry = storage.get_mut(&vault).ok_or_else(|| vault_not_found(&vault))?;
        if entry.blobs.contains_key(&blob_id) {
            return Err(Error::AlreadyExists(format!("Blob already exists: {}", blob_id)));
        }
        entry.blobs.insert(blob_id, Arc::new(buffer));
        Ok(())
    }
}
