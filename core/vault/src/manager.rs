//! Vault manager for creating and managing vaults.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{EncryptionLevel, VaultConfig, CONFIG_FILENAME};
use crate::session::VaultSession;
use crate::tree::{DirectoryNode, FileTree};
use crate::unlock::{UnlockContext, UnlockMechanism};
use lifechest_common::{Error, Result, VaultId};
use lifechest_crypto::generate_id;
use lifechest_storage::ContentStore;

/// What the user chose when creating a vault.
#[derive(Debug, Clone)]
pub struct VaultPolicy {
    pub name: String,
    pub encryption_level: EncryptionLevel,
    pub mechanism: UnlockMechanism,
}

impl VaultPolicy {
    pub fn new(name: impl Into<String>, mechanism: UnlockMechanism) -> Self {
        Self {
            name: name.into(),
            encryption_level: EncryptionLevel::default(),
            mechanism,
        }
    }

    pub fn with_encryption_level(mut self, level: EncryptionLevel) -> Self {
        self.encryption_level = level;
        self
    }
}

/// Vault manager for creating, listing, opening and deleting vaults.
pub struct VaultManager {
    store: Arc<dyn ContentStore>,
    version_code: u64,
}

impl VaultManager {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            version_code: 0,
        }
    }

    /// Application version recorded in newly created vaults.
    pub fn with_version_code(mut self, version_code: u64) -> Self {
        self.version_code = version_code;
        self
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Create a new vault.
    ///
    /// # Preconditions
    /// - Name must not be empty
    /// - The mechanism must be available in `ctx`
    ///
    /// # Postconditions
    /// - Vault directory holds the config and an empty manifest
    /// - Returns an unlocked session
    ///
    /// # Errors
    /// - `MechanismUnavailable` before anything is written
    /// - Any mechanism error (`Cancelled`, weak secret...)
    /// - Storage failure; the half-created vault is removed
    pub async fn create_vault(
        &self,
        policy: VaultPolicy,
        ctx: &UnlockContext<'_>,
    ) -> Result<VaultSession> {
        if policy.name.trim().is_empty() {
            return Err(Error::InvalidInput("Vault name cannot be empty".to_string()));
        }
        if !policy.mechanism.is_available(ctx) {
            return Err(Error::MechanismUnavailable(format!(
                "Unlock mechanism {} is not available",
                policy.mechanism
            )));
        }

        let id = VaultId::new(generate_id())?;
        let mut config = VaultConfig::new(
            id,
            policy.name,
            policy.encryption_level,
            policy.mechanism,
            self.version_code,
        );
        let key = policy.mechanism.issue_key_at_creation(&mut config, ctx).await?;

        let tree = FileTree::new(DirectoryNode::new(config.name.clone()));
        let session = VaultSession::unlocked(config, self.store.clone(), key, tree);

        if let Err(e) = self.initialize_vault_structure(&session) {
            let id = session.vault_id();
            warn!(vault_id = %id, error = %e, "Vault creation failed");
            if let Err(cleanup) = policy.mechanism.delete_state(id, ctx) {
                warn!(vault_id = %id, error = %cleanup, "Unlock state not removed");
            }
            if self.store.vault_exists(id).unwrap_or(false) {
                if let Err(cleanup) = self.store.delete_vault_dir(id) {
                    warn!(vault_id = %id, error = %cleanup, "Vault directory not removed");
                }
            }
            return Err(e);
        }

        info!(vault_id = %session.vault_id(), mechanism = %policy.mechanism, "Vault created");
        Ok(session)
    }

    fn initialize_vault_structure(&self, session: &VaultSession) -> Result<()> {
        self.store.create_vault_dir(session.vault_id())?;
        session.save_tree()?;
        session.save_config()
    }

    /// Configs of every vault in the store.
    ///
    /// Vaults whose config cannot be read are skipped.
    pub fn list_vaults(&self) -> Result<Vec<VaultConfig>> {
        let mut configs = Vec::new();
        for id in self.store.list_vaults()? {
            match self.read_config(&id) {
                Ok(config) => configs.push(config),
                Err(e) => warn!(vault_id = %id, error = %e, "Skipping unreadable vault"),
            }
        }
        Ok(configs)
    }

    /// Load a vault's config into a locked session.
    ///
    /// # Errors
    /// - `NotFound` if no such vault
    /// - `Corruption` if the config is unreadable or belongs elsewhere
    pub fn load_vault(&self, id: &VaultId) -> Result<VaultSession> {
        if !self.store.vault_exists(id)? {
            return Err(Error::NotFound(format!("Vault not found: {}", id)));
        }
        let config = self.read_config(id)?;
        Ok(VaultSession::locked(config, self.store.clone()))
    }

    /// Load and unlock a vault.
    pub async fn open_vault(&self, id: &VaultId, ctx: &UnlockContext<'_>) -> Result<VaultSession> {
        let mut session = self.load_vault(id)?;
        session.unlock(ctx).await?;
        Ok(session)
    }

    /// Delete a vault and its mechanism state.
    ///
    /// # Errors
    /// - `NotFound` if no such vault
    /// - `MechanismUnavailable` if the mechanism state cannot be removed;
    ///   the directory is then left in place
    /// - Storage failure if the directory cannot be fully removed
    pub fn delete_vault(&self, id: &VaultId, ctx: &UnlockContext<'_>) -> Result<()> {
        if !self.store.vault_exists(id)? {
            return Err(Error::NotFound(format!("Vault not found: {}", id)));
        }

        match self.read_config(id).and_then(|config| config.mechanism()) {
            Ok(mechanism) => mechanism.delete_state(id, ctx)?,
            Err(e) => warn!(vault_id = %id, error = %e, "Unknown mechanism, skipping cleanup"),
        }
        self.store.delete_vault_dir(id)?;

        info!(vault_id = %id, "Vault deleted");
        Ok(())
    }

    fn read_config(&self, id: &VaultId) -> Result<VaultConfig> {
        let bytes = self.store.read_metadata(id, CONFIG_FILENAME)?;
        let config = VaultConfig::from_bytes(&bytes)
            .map_err(|e| Error::Corruption(format!("Unreadable config of {}: {}", id, e)))?;
        if &config.id != id {
            return Err(Error::Corruption(format!(
                "Config of {} declares id {}",
                id, config.id
            )));
        }
        Ok(config)
    }
}
