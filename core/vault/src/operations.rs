//! Vault file operations with encryption/decryption.
//!
//! Every mutation edits the in-memory tree first and then persists the
//! manifest before returning. If the save fails the edit is reverted.

use chrono::{DateTime, Utc};
use std::io::{Read, Write};
use tracing::{debug, info, warn};

use crate::blob::EncryptedBlobRef;
use crate::session::VaultSession;
use crate::sort::SortMethod;
use crate::tree::{DirectoryNode, FileNode, FileTree, TreeNode};
use lifechest_common::{Error, Result};
use lifechest_crypto::DecryptedChunks;
use lifechest_storage::BlobReader;

/// Description of a file about to be imported.
#[derive(Debug, Clone)]
pub struct FileImport {
    pub name: String,
    pub mime_type: String,
    /// Date of the original content. Defaults to now.
    pub creation_date: DateTime<Utc>,
    pub thumbnail: Option<Vec<u8>>,
}

impl FileImport {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            creation_date: Utc::now(),
            thumbnail: None,
        }
    }

    pub fn with_creation_date(mut self, date: DateTime<Utc>) -> Self {
        self.creation_date = date;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Vec<u8>) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }
}

/// Vault operations handler.
///
/// Borrows an unlocked session for the duration of the operations.
pub struct VaultOperations<'a> {
    session: &'a mut VaultSession,
}

impl<'a> VaultOperations<'a> {
    /// Create new operations handler for a session.
    pub fn new(session: &'a mut VaultSession) -> Result<Self> {
        if !session.is_unlocked() {
            return Err(Error::NotPermitted("Session is not unlocked".to_string()));
        }
        Ok(Self { session })
    }

    /// Encrypt `reader` into a new file under `parent_id`.
    ///
    /// # Preconditions
    /// - Parent must be a directory of this vault
    ///
    /// # Postconditions
    /// - Content and thumbnail blobs exist
    /// - Node is in the tree and the manifest is saved
    ///
    /// # Errors
    /// - Parent not found or not a directory
    /// - Encryption or storage failure; no blob is left behind
    pub fn import_file<R: Read>(
        &mut self,
        parent_id: &str,
        import: FileImport,
        reader: R,
    ) -> Result<FileNode> {
        self.session.tree()?.directory(parent_id)?;
        let store = self.session.store().clone();
        let vault_id = self.session.vault_id().clone();

        let (content, size) = EncryptedBlobRef::encrypt_from(
            store.as_ref(),
            &vault_id,
            self.session.key()?,
            reader,
            import.creation_date,
        )?;

        let thumbnail = import.thumbnail.as_deref().and_then(|bytes| {
            match EncryptedBlobRef::encrypt_from(
                store.as_ref(),
                &vault_id,
                self.session.key().ok()?,
                bytes,
                import.creation_date,
            ) {
                Ok((blob, _)) => Some(blob),
                Err(e) => {
                    warn!(vault_id = %vault_id, error = %e, "Thumbnail not stored");
                    None
                }
            }
        });

        let node = FileNode {
            import_date: content.import_date,
            attached_file: content,
            attached_thumbnail: thumbnail,
            name: import.name,
            mime_type: import.mime_type,
            creation_date: import.creation_date,
            size,
        };

        let snapshot = self.session.tree()?.clone();
        let mut saved = self
            .session
            .tree_mut()
            .and_then(|tree| tree.add(parent_id, TreeNode::File(node.clone())));
        if saved.is_ok() {
            saved = self.persist(snapshot);
        }
        if let Err(e) = saved {
            self.delete_blobs(&TreeNode::File(node));
            return Err(e);
        }

        info!(vault_id = %vault_id, file_id = %node.id(), size, "File imported");
        Ok(node)
    }

    /// Create an empty directory and return its id.
    pub fn create_directory(&mut self, parent_id: &str, name: impl Into<String>) -> Result<String> {
        let directory = DirectoryNode::new(name);
        let id = directory.id.clone();

        let snapshot = self.session.tree()?.clone();
        self.session
            .tree_mut()?
            .add(parent_id, TreeNode::Directory(directory))?;
        self.persist(snapshot)?;

        debug!(vault_id = %self.session.vault_id(), directory_id = %id, "Directory created");
        Ok(id)
    }

    /// Change a node's display name. Blobs are untouched.
    pub fn rename(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidInput("Name cannot be empty".to_string()));
        }
        let snapshot = self.session.tree()?.clone();
        self.session.tree_mut()?.rename(id, name)?;
        self.persist(snapshot)
    }

    /// Move a node under another directory.
    pub fn move_node(&mut self, id: &str, new_parent_id: &str) -> Result<()> {
        let snapshot = self.session.tree()?.clone();
        self.session.tree_mut()?.move_node(id, new_parent_id)?;
        self.persist(snapshot)
    }

    /// Save the manifest, putting `snapshot` back in memory if that fails.
    fn persist(&mut self, snapshot: FileTree) -> Result<()> {
        if let Err(e) = self.session.save_tree() {
            warn!(vault_id = %self.session.vault_id(), error = %e, "Manifest not saved, edit reverted");
            *self.session.tree_mut()? = snapshot;
            return Err(e);
        }
        Ok(())
    }

    /// Delete a node and every blob of its subtree.
    ///
    /// Blobs go first so an interrupted delete never leaves ciphertext
    /// the manifest no longer references. Blobs already missing are
    /// skipped.
    ///
    /// # Errors
    /// - `NotPermitted` for the root
    /// - `NotFound` if no such node
    /// - Storage failure while deleting a blob; the tree is unchanged
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let tree = self.session.tree()?;
        if id == tree.root_id() {
            return Err(Error::NotPermitted("Cannot delete the root directory".to_string()));
        }

        let store = self.session.store();
        for blob in tree.node(id)?.blobs() {
            match blob.delete(store.as_ref()) {
                Ok(()) | Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.session.tree_mut()?.remove(id)?;
        self.session.save_tree()?;

        info!(vault_id = %self.session.vault_id(), node_id = %id, "Node deleted");
        Ok(())
    }

    /// Decrypt a whole file into memory.
    pub fn read_file(&self, id: &str) -> Result<Vec<u8>> {
        self.file(id)?
            .attached_file
            .decrypt_to_vec(self.session.store().as_ref(), self.session.key()?)
    }

    /// Decrypt a file into `writer`, returning the bytes written.
    pub fn extract_to<W: Write>(&self, id: &str, writer: W) -> Result<u64> {
        self.file(id)?
            .attached_file
            .decrypt_to(self.session.store().as_ref(), self.session.key()?, writer)
    }

    /// Lazily decrypt a file chunk by chunk.
    ///
    /// The iterator is single-pass and holds the blob open until it is
    /// exhausted or dropped.
    pub fn chunks(&self, id: &str) -> Result<DecryptedChunks<Box<dyn BlobReader>>> {
        self.file(id)?
            .attached_file
            .chunks(self.session.store().as_ref(), self.session.key()?)
    }

    /// Decrypt `length` bytes at `offset` of a file.
    pub fn read_range(&self, id: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.file(id)?.attached_file.decrypt_random_access(
            self.session.store().as_ref(),
            self.session.key()?,
            offset,
            length,
        )
    }

    /// Decrypted thumbnail of a file, if it has one.
    pub fn read_thumbnail(&self, id: &str) -> Result<Option<Vec<u8>>> {
        self.file(id)?
            .attached_thumbnail
            .as_ref()
            .map(|blob| blob.decrypt_to_vec(self.session.store().as_ref(), self.session.key()?))
            .transpose()
    }

    /// Children of a directory in display order.
    pub fn list(&self, directory_id: &str, sort: SortMethod) -> Result<Vec<&TreeNode>> {
        let directory = self.session.tree()?.directory(directory_id)?;
        Ok(sort.sort_items(&directory.children))
    }

    /// Every file of the vault.
    pub fn list_files(&self) -> Result<Vec<&FileNode>> {
        Ok(self.session.tree()?.list_files())
    }

    fn file(&self, id: &str) -> Result<&FileNode> {
        self.session.tree()?.file(id)
    }

    fn delete_blobs(&self, node: &TreeNode) {
        let store = self.session.store();
        for blob in node.blobs() {
            if let Err(e) = blob.delete(store.as_ref()) {
                warn!(blob_id = %blob.id, error = %e, "Orphaned blob not removed");
            }
        }
    }
}
