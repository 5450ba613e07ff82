//! Import of LCEF containers into an unlocked vault.

use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, info, warn};

use crate::format::{read_header, LcefHeader};
use lifechest_common::{Error, Result, VaultId};
use lifechest_crypto::{decrypt_bytes, decrypt_utf8, verify_fingerprint, CipherReader, VaultKey};
use lifechest_vault::{
    EncryptedBlobRef, FileNode, TreeNode, UnlockContext, UnlockMechanism, VaultSession,
};

/// A container whose header has been read.
pub struct Container<R> {
    header: LcefHeader,
    body: R,
}

impl<R: Read> Container<R> {
    /// Read the header, keeping the reader positioned at the body.
    pub fn open(mut reader: R) -> Result<Self> {
        let header = read_header(&mut reader)?;
        Ok(Self {
            header,
            body: reader,
        })
    }

    pub fn header(&self) -> &LcefHeader {
        &self.header
    }

    /// Id of the vault the file was exported from.
    pub fn source_vault(&self) -> &str {
        &self.header.vault_id
    }
}

/// Import every container under `parent_id` of the destination vault.
///
/// Containers are grouped by source vault and each source mechanism is
/// run once, so credentials are asked once per source vault. The import is
/// all or nothing: on any error the blobs written so far are removed and
/// the tree is left untouched. The manifest is saved once at the end.
///
/// # Errors
/// - `UnsupportedFormat` / `Corruption` for a malformed container
/// - `Credential` if a recovered key does not match its fingerprint
/// - Any mechanism error, such as `Cancelled`
pub async fn import_containers<R: Read>(
    session: &mut VaultSession,
    parent_id: &str,
    containers: Vec<Container<R>>,
    ctx: &UnlockContext<'_>,
) -> Result<Vec<FileNode>> {
    session.tree()?.directory(parent_id)?;

    let mut keys: HashMap<String, VaultKey> = HashMap::new();
    for container in &containers {
        if !keys.contains_key(container.source_vault()) {
            let key = source_key(&container.header, ctx).await?;
            keys.insert(container.source_vault().to_string(), key);
        }
    }

    let mut nodes = Vec::with_capacity(containers.len());
    for container in containers {
        let Some(key) = keys.get(container.source_vault()) else {
            discard(session, &nodes);
            return Err(Error::NotFound(format!(
                "No key for source vault {}",
                container.source_vault()
            )));
        };
        match reencrypt(session, container, key) {
            Ok(node) => nodes.push(node),
            Err(e) => {
                discard(session, &nodes);
                return Err(e);
            }
        }
    }

    if let Err(e) = insert_all(session, parent_id, &nodes) {
        discard(session, &nodes);
        return Err(e);
    }

    info!(vault_id = %session.vault_id(), count = nodes.len(), "Containers imported");
    Ok(nodes)
}

/// Recover and check the key of the vault a container came from.
async fn source_key(header: &LcefHeader, ctx: &UnlockContext<'_>) -> Result<VaultKey> {
    let vault_id = VaultId::new(header.vault_id.clone())
        .map_err(|_| Error::Corruption("Container has an invalid vault id".to_string()))?;
    let mechanism = UnlockMechanism::from_id(&header.unlock_method).map_err(|_| {
        Error::UnsupportedFormat(format!("Unknown unlock method: {}", header.unlock_method))
    })?;

    let key = mechanism
        .issue_key_at_unlock(&vault_id, &header.additional_unlock_data, ctx)
        .await?;
    if !verify_fingerprint(&key, &header.key_hash) {
        warn!(source_vault = %vault_id, "Recovered key does not match the container");
        return Err(Error::Credential(
            "Key does not match the exported file".to_string(),
        ));
    }

    debug!(source_vault = %vault_id, "Source vault key recovered");
    Ok(key)
}

/// Write the container's content as new blobs of the destination vault.
fn reencrypt<R: Read>(
    session: &VaultSession,
    container: Container<R>,
    source_key: &VaultKey,
) -> Result<FileNode> {
    let header = &container.header;
    let metadata = header.metadata()?;
    let creation_date = metadata.creation_date()?;

    let name = decrypt_utf8(source_key, &header.file_name_iv()?, &header.encrypted_file_name)
        .map_err(|_| Error::Corruption("Unreadable file name".to_string()))?;

    let store = session.store().as_ref();
    let vault_id = session.vault_id();
    let key = session.key()?;

    let thumbnail = match header.thumbnail_iv()? {
        Some(iv) => {
            let plaintext = decrypt_bytes(source_key, &iv, &header.thumbnail)?;
            let (blob, _) =
                EncryptedBlobRef::encrypt_from(store, vault_id, key, &plaintext[..], creation_date)?;
            Some(blob)
        }
        None => None,
    };

    let plaintext = CipherReader::new(container.body, source_key, &header.body_iv()?)?;
    let (content, size) =
        match EncryptedBlobRef::encrypt_from(store, vault_id, key, plaintext, creation_date) {
            Ok(written) => written,
            Err(e) => {
                delete_quietly(session, thumbnail.as_ref());
                return Err(e);
            }
        };

    let node = FileNode {
        import_date: content.import_date,
        attached_file: content,
        attached_thumbnail: thumbnail,
        name,
        mime_type: metadata.mime_type.clone(),
        creation_date,
        size,
    };

    if size != metadata.size {
        discard(session, std::slice::from_ref(&node));
        return Err(Error::Corruption(format!(
            "Container body is {} bytes, expected {}",
            size, metadata.size
        )));
    }
    Ok(node)
}

fn insert_all(session: &mut VaultSession, parent_id: &str, nodes: &[FileNode]) -> Result<()> {
    let tree = session.tree_mut()?;
    let snapshot = tree.clone();
    for node in nodes {
        if let Err(e) = tree.add(parent_id, TreeNode::File(node.clone())) {
            *tree = snapshot;
            return Err(e);
        }
    }

    if let Err(e) = session.save_tree() {
        *session.tree_mut()? = snapshot;
        return Err(e);
    }
    Ok(())
}

fn discard(session: &VaultSession, nodes: &[FileNode]) {
    for node in nodes {
        delete_quietly(session, Some(&node.attached_file));
        delete_quietly(session, node.attached_thumbnail.as_ref());
    }
}

fn delete_quietly(session: &VaultSession, blob: Option<&EncryptedBlobRef>) {
    if let Some(blob) = blob {
        if let Err(e) = blob.delete(session.store().as_ref()) {
            warn!(blob_id = %blob.id, error = %e, "Orphaned blob not removed");
        }
    }
}
