//! Export of a single file into an LCEF container.

use std::io::{self, Write};
use tracing::info;

use crate::format::{write_header, FileMetadata, LcefHeader};
use lifechest_common::{Error, Result};
use lifechest_crypto::{encrypt_bytes, encrypt_utf8, key_fingerprint, Iv};
use lifechest_vault::VaultSession;

/// Write `file_id` of an unlocked vault as a container.
///
/// The file name and thumbnail are encrypted again under fresh IVs; the
/// body ciphertext is copied verbatim.
///
/// # Returns
/// Total number of bytes written.
///
/// # Errors
/// - `NotPermitted` if the vault's unlock mechanism cannot be exported or
///   the session is locked
/// - `NotFound` / `InvalidInput` if `file_id` is not a file
pub fn export_file<W: Write>(session: &VaultSession, file_id: &str, mut writer: W) -> Result<u64> {
    let mechanism = session.mechanism()?;
    if !mechanism.supports_export() {
        return Err(Error::NotPermitted(format!(
            "Files of {} vaults cannot be exported",
            mechanism
        )));
    }

    let key = session.key()?;
    let store = session.store().as_ref();
    let node = session.tree()?.file(file_id)?;

    let name_iv = Iv::generate();
    let (thumbnail, thumbnail_iv) = match &node.attached_thumbnail {
        Some(blob) => {
            let iv = Iv::generate();
            let plaintext = blob.decrypt_to_vec(store, key)?;
            (encrypt_bytes(key, &iv, &plaintext)?, iv.as_bytes().to_vec())
        }
        None => (Vec::new(), Vec::new()),
    };

    let header = LcefHeader {
        key_hash: key_fingerprint(key).to_vec(),
        iv: node.attached_file.iv.as_bytes().to_vec(),
        unlock_method: mechanism.id().to_string(),
        additional_unlock_data: session.config().additional_unlock_data.clone(),
        encrypted_file_name_iv: name_iv.as_bytes().to_vec(),
        encrypted_file_name: encrypt_utf8(key, &name_iv, &node.name)?,
        file_metadata: Some(FileMetadata {
            name: String::new(),
            mime_type: node.mime_type.clone(),
            size: node.size,
            creation_date: node.creation_date.timestamp_millis(),
            last_modified: node.import_date.timestamp_millis(),
        }),
        file_id: node.id().to_string(),
        vault_id: session.vault_id().to_string(),
        thumbnail,
        thumbnail_iv,
    };

    let header_len = write_header(&mut writer, &header)?;
    let mut body = node.attached_file.open_ciphertext(store)?;
    let body_len = io::copy(&mut body, &mut writer)?;
    writer.flush()?;

    info!(vault_id = %session.vault_id(), file_id, size = body_len, "File exported");
    Ok(header_len + body_len)
}
