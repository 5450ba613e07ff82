//! Local filesystem content store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/vaults/<vaultId>/.config.json
//! <root>/vaults/<vaultId>/.<fileListId>
//! <root>/vaults/<vaultId>/<blobId>
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::store::{
    check_blob_id, check_metadata_name, BlobReader, BlobWriter, ContentStore, PARTIAL_SUFFIX,
};
use lifechest_common::{Error, Result, VaultId};

/// Local filesystem content store.
pub struct LocalStore {
    vaults_dir: PathBuf,
}

impl LocalStore {
    /// Create a new local store with the given root directory.
    ///
    /// # Postconditions
    /// - `<root>/vaults` exists
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let vaults_dir = root.as_ref().join("vaults");
        fs::create_dir_all(&vaults_dir)?;
        Ok(Self { vaults_dir })
    }

    /// Directory holding one vault.
    pub fn vault_path(&self, vault: &VaultId) -> PathBuf {
        self.vaults_dir.join(vault.as_str())
    }

    fn existing_vault_path(&self, vault: &VaultId) -> Result<PathBuf> {
        let path = self.vault_path(vault);
        if !path.is_dir() {
            return Err(Error::NotFound(format!("Vault not found: {}", vault)));
        }
        Ok(path)
    }

    fn blob_path(&self, vault: &VaultId, blob_id: &str) -> Result<PathBuf> {
        check_blob_id(blob_id)?;
        Ok(self.existing_vault_path(vault)?.join(blob_id))
    }
}

fn not_found_or(err: io::Error, what: impl FnOnce() -> String) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound(what())
    } else {
        Error::Io(err)
    }
}

impl ContentStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    fn create_vault_dir(&self, vault: &VaultId) -> Result<()> {
        let path = self.vault_path(vault);
        if path.exists() {
            return Err(Error::AlreadyExists(format!("Vault already exists: {}", vault)));
        }
        fs::create_dir(&path)?;
        debug!(vault_id = %vault, "Created vault directory");
        Ok(())
    }

    fn delete_vault_dir(&self, vault: &VaultId) -> Result<()> {
        let path = self.existing_vault_path(vault)?;
        fs::remove_dir_all(&path)
            .map_err(|e| Error::Storage(format!("Failed to delete vault {}: {}", vault, e)))?;

        if path.exists() {
            return Err(Error::Storage(format!(
                "Vault directory still present after delete: {}",
                vault
            )));
        }
        debug!(vault_id = %vault, "Deleted vault directory");
        Ok(())
    }

    fn vault_exists(&self, vault: &VaultId) -> Result<bool> {
        Ok(self.vault_path(vault).is_dir())
    }

    fn list_vaults(&self) -> Result<Vec<VaultId>> {
        let mut vaults = Vec::new();
        for entry in fs::read_dir(&self.vaults_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match VaultId::new(name) {
                Ok(id) => vaults.push(id),
                Err(e) => warn!(error = %e, "Ignoring foreign directory in vault root"),
            }
        }
        vaults.sort();
        Ok(vaults)
    }

    fn create_blob(&self, vault: &VaultId, blob_id: &str) -> Result<Box<dyn BlobWriter>> {
        let final_path = self.blob_path(vault, blob_id)?;
        if final_path.exists() {
            return Err(Error::AlreadyExists(format!("Blob already exists: {}", blob_id)));
        }

        let partial_path = final_path.with_file_name(format!("{}{}", blob_id, PARTIAL_SUFFIX));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    Error::AlreadyExists(format!("Blob is being written: {}", blob_id))
                } else {
                    Error::Io(e)
                }
            })?;

        Ok(Box::new(LocalBlobWriter {
            file: Some(BufWriter::new(file)),
            partial_path,
            final_path,
        }))
    }

    fn open_blob(&self, vault: &VaultId, blob_id: &str) -> Result<Box<dyn BlobReader>> {
        let path = self.blob_path(vault, blob_id)?;
        let file =
            File::open(&path).map_err(|e| not_found_or(e, || format!("Blob not found: {}", blob_id)))?;
        Ok(Box::new(file))
    }

    fn blob_len(&self, vault: &VaultId, blob_id: &str) -> Result<u64> {
        let path = self.blob_path(vault, blob_id)?;
        let meta = fs::metadata(&path)
            .map_err(|e| not_found_or(e, || format!("Blob not found: {}", blob_id)))?;
        Ok(meta.len())
    }

    fn blob_exists(&self, vault: &VaultId, blob_id: &str) -> Result<bool> {
        Ok(self.blob_path(vault, blob_id)?.is_file())
    }

    fn delete_blob(&self, vault: &VaultId, blob_id: &str) -> Result<()> {
        let path = self.blob_path(vault, blob_id)?;
        fs::remove_file(&path)
            .map_err(|e| not_found_or(e, || format!("Blob not found: {}", blob_id)))?;
        debug!(vault_id = %vault, blob_id, "Deleted blob");
        Ok(())
    }

    fn list_blobs(&self, vault: &VaultId) -> Result<Vec<String>> {
        let path = self.existing_vault_path(vault)?;
        let mut blobs = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if check_blob_id(name).is_ok() {
                    blobs.push(name.to_string());
                }
            }
        }
        blobs.sort();
        Ok(blobs)
    }

    fn read_metadata(&self, vault: &VaultId, name: &str) -> Result<Vec<u8>> {
        check_metadata_name(name)?;
        let path = self.existing_vault_path(vault)?.join(name);
        fs::read(&path).map_err(|e| not_found_or(e, || format!("Metadata not found: {}", name)))
    }

    fn write_metadata(&self, vault: &VaultId, name: &str, data: &[u8]) -> Result<()> {
        check_metadata_name(name)?;
        let dir = self.existing_vault_path(vault)?;
        let target = dir.join(name);
        let temp = dir.join(format!("{}.tmp", name));

        {
            let mut file = File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(Error::Storage(format!("Failed to replace {}: {}", name, e)));
        }
        Ok(())
    }
}

/// Writer staging a blob in `<blobId>.partial`.
struct LocalBlobWriter {
    file: Option<BufWriter<File>>,
    partial_path: PathBuf,
    final_path: PathBuf,
}

impl LocalBlobWriter {
    fn file(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "blob writer already closed"))
    }
}

impl Write for LocalBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl BlobWriter for LocalBlobWriter {
    fn commit(mut self: Box<Self>) -> Result<()> {
        let writer = self
            .file
            .take()
            .ok_or_else(|| Error::Storage("Blob writer already closed".to_string()))?;
        let file = writer
            .into_inner()
            .map_err(|e| Error::Storage(format!("Failed to flush blob: {}", e.error())))?;
        file.sync_all()?;
        drop(file);

        if self.final_path.exists() {
            return Err(Error::AlreadyExists(format!(
                "Blob already exists: {}",
                self.final_path.display()
            )));
        }
        fs::rename(&self.partial_path, &self.final_path)
            .map_err(|e| Error::Storage(format!("Failed to commit blob: {}", e)))?;
        debug!(path = %self.final_path.display(), "Committed blob");
        Ok(())
    }
}

impl Drop for LocalBlobWriter {
    fn drop(&mut self) {
        self.file.take();
        if self.partial_path.exists() {
            if let Err(e) = fs::remove_file(&self.partial_path) {
                warn!(error = %e, "Failed to remove partial blob");
            }
        }
    }
}
