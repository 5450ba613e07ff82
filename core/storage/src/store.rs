//! Content store trait definition.

use std::io::{Read, Seek, Write};

use lifechest_common::{Error, Result, VaultId};

/// Readable, seekable view of one committed blob.
pub trait BlobReader: Read + Seek + Send {}

impl<T: Read + Seek + Send> BlobReader for T {}

/// Write handle for a new blob.
///
/// Bytes are staged until `commit`; a writer dropped without committing
/// leaves no blob behind.
pub trait BlobWriter: Write + Send {
    /// Make the blob visible under its id.
    ///
    /// # Errors
    /// - Flush or rename failure
    /// - A blob with the same id was committed meanwhile
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Vault-scoped storage for ciphertext blobs and per-vault metadata files.
///
/// Blobs are write-once: an id is created, committed, read any number of
/// times and finally deleted, but never overwritten. Metadata files (the
/// config and the manifest) are the only entries that get replaced, and
/// replacement is atomic.
pub trait ContentStore: Send + Sync {
    /// Get the store name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Create the directory of a new vault.
    ///
    /// # Errors
    /// - The vault directory already exists
    fn create_vault_dir(&self, vault: &VaultId) -> Result<()>;

    /// Delete a vault directory and everything in it.
    ///
    /// # Errors
    /// - Vault not found
    /// - Anything left behind after deletion
    fn delete_vault_dir(&self, vault: &VaultId) -> Result<()>;

    /// Check if a vault directory exists.
    fn vault_exists(&self, vault: &VaultId) -> Result<bool>;

    /// List every vault directory.
    ///
    /// Entries whose names are not valid vault ids are ignored.
    fn list_vaults(&self) -> Result<Vec<VaultId>>;

    /// Start writing a new blob.
    ///
    /// # Errors
    /// - Vault not found
    /// - A blob with this id already exists
    fn create_blob(&self, vault: &VaultId, blob_id: &str) -> Result<Box<dyn BlobWriter>>;

    /// Open a committed blob for reading.
    fn open_blob(&self, vault: &VaultId, blob_id: &str) -> Result<Box<dyn BlobReader>>;

    /// Length of a committed blob in bytes.
    fn blob_len(&self, vault: &VaultId, blob_id: &str) -> Result<u64>;

    /// Check if a committed blob exists.
    fn blob_exists(&self, vault: &VaultId, blob_id: &str) -> Result<bool>;

    /// Delete a blob.
    ///
    /// # Errors
    /// - Blob not found
    fn delete_blob(&self, vault: &VaultId, blob_id: &str) -> Result<()>;

    /// Ids of all committed blobs in a vault.
    fn list_blobs(&self, vault: &VaultId) -> Result<Vec<String>>;

    /// Read a metadata file such as `.config.json`.
    fn read_metadata(&self, vault: &VaultId, name: &str) -> Result<Vec<u8>>;

    /// Atomically create or replace a metadata file.
    fn write_metadata(&self, vault: &VaultId, name: &str, data: &[u8]) -> Result<()>;
}

/// Blob ids become file names, so they must be non-empty lowercase hex.
pub(crate) fn check_blob_id(blob_id: &str) -> Result<()> {
    if blob_id.is_empty() || !lifechest_common::types::is_lower_hex(blob_id) {
        return Err(Error::InvalidInput(format!("Invalid blob id: {}", blob_id)));
    }
    Ok(())
}

/// Metadata files are dotfiles with no path components.
pub(crate) fn check_metadata_name(name: &str) -> Result<()> {
    let valid = name.len() > 1
        && name.starts_with('.')
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.ends_with(PARTIAL_SUFFIX);
    if !valid {
        return Err(Error::InvalidInput(format!(
            "Invalid metadata file name: {}",
            name
        )));
    }
    Ok(())
}

/// Suffix of blobs that have not been committed yet.
pub const PARTIAL_SUFFIX: &str = ".partial";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_id_must_be_hex() {
        assert!(check_blob_id("0a1b2c").is_ok());
        assert!(check_blob_id("").is_err());
        assert!(check_blob_id("../x").is_err());
        assert!(check_blob_id(".config.json").is_err());
    }

    #[test]
    fn test_metadata_name_rules() {
        assert!(check_metadata_name(".config.json").is_ok());
        assert!(check_metadata_name(".00ff").is_ok());
        assert!(check_metadata_name("config.json").is_err());
        assert!(check_metadata_name(".").is_err());
        assert!(check_metadata_name("..").is_err());
        assert!(check_metadata_name("./a").is_err());
    }
}
