//! Vault configuration and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sort::SortMethod;
use crate::unlock::UnlockMechanism;
use lifechest_common::{encoding::base64_map, Error, Result, VaultId};
use lifechest_crypto::{generate_id, Iv};

/// Configuration file name in the vault directory.
pub const CONFIG_FILENAME: &str = ".config.json";

/// Name of the manifest file for a given file list id.
pub fn manifest_filename(file_list_id: &str) -> String {
    format!(".{}", file_list_id)
}

/// How aggressively an unlocked vault closes when the app leaves the
/// foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EncryptionLevel {
    /// Stay open.
    Never = 0,
    /// Offer a one-shot "close" notification.
    AskToClose = 1,
    /// Close as soon as the vault leaves the foreground.
    #[default]
    CloseImmediately = 2,
}

impl TryFrom<u8> for EncryptionLevel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Never),
            1 => Ok(Self::AskToClose),
            2 => Ok(Self::CloseImmediately),
            other => Err(Error::InvalidInput(format!(
                "Invalid encryption level: {}",
                other
            ))),
        }
    }
}

impl From<EncryptionLevel> for u8 {
    fn from(level: EncryptionLevel) -> Self {
        level as u8
    }
}

/// Plaintext vault configuration.
///
/// Stored as `.config.json` in the vault directory. Nothing in here is
/// secret: the mechanism's auxiliary data only holds wrapped keys and IVs.
/// Unknown fields are ignored so newer configs stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Display name.
    pub name: String,
    /// Unique vault identifier, also the directory name.
    pub id: VaultId,
    /// Vault creation timestamp.
    pub creation_date: DateTime<Utc>,
    /// Id of the manifest blob (stored as `.<fileListId>`).
    pub file_list_id: String,
    /// Closure policy.
    pub encryption_level: EncryptionLevel,
    /// Identifier of the unlock mechanism (`password`, `pin`, `biometric`).
    pub unlock_mechanism_type: String,
    /// Mechanism-private auxiliary data.
    #[serde(default, with = "base64_map")]
    pub additional_unlock_data: BTreeMap<String, Vec<u8>>,
    /// Application version that created the vault.
    #[serde(default)]
    pub version_code: u64,
    /// Display sort preference.
    #[serde(default)]
    pub sort_method: SortMethod,
    /// IV of the manifest, fixed for the vault's lifetime.
    pub file_tree_iv: Iv,
}

impl VaultConfig {
    /// Create a configuration for a brand new vault.
    ///
    /// # Postconditions
    /// - Manifest id and manifest IV are freshly generated
    /// - Auxiliary data is empty until the mechanism fills it in
    pub fn new(
        id: VaultId,
        name: impl Into<String>,
        encryption_level: EncryptionLevel,
        mechanism: UnlockMechanism,
        version_code: u64,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            creation_date: Utc::now(),
            file_list_id: generate_id(),
            encryption_level,
            unlock_mechanism_type: mechanism.id().to_string(),
            additional_unlock_data: BTreeMap::new(),
            version_code,
            sort_method: SortMethod::default(),
            file_tree_iv: Iv::generate(),
        }
    }

    /// The configured unlock mechanism.
    ///
    /// # Errors
    /// - Unknown mechanism id
    pub fn mechanism(&self) -> Result<UnlockMechanism> {
        UnlockMechanism::from_id(&self.unlock_mechanism_type)
    }

    /// Name of this vault's manifest file.
    pub fn manifest_filename(&self) -> String {
        manifest_filename(&self.file_list_id)
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize to bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}
