//! Vault session management.
//!
//! A session carries one vault through `Locked -> Unlocking -> Unlocked`
//! and back to `Locked` or `Closed`. The key and the decrypted tree only
//! exist while unlocked and the key is zeroized when it is dropped.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EncryptionLevel, VaultConfig, CONFIG_FILENAME};
use crate::operations::VaultOperations;
use crate::reader::ContentResolver;
use crate::sort::SortMethod;
use crate::tree::FileTree;
use crate::unlock::{UnlockContext, UnlockMechanism};
use lifechest_common::{Error, Result, VaultId};
use lifechest_crypto::{decrypt_utf8, encrypt_utf8, mac, VaultKey};
use lifechest_storage::ContentStore;

/// Session handle for tracking active sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Generate a new unique session handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// Config loaded, no key, no tree.
    Locked,
    /// A candidate key is being checked against the manifest.
    Unlocking,
    /// Key and tree are in memory.
    Unlocked,
    /// Key and tree dropped; the session is finished.
    Closed,
}

/// What the caller should do after the vault left the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundAction {
    /// Keep the vault open.
    None,
    /// Post a one-shot notification offering to close the vault.
    NotifyToClose,
    /// The vault has been closed.
    Closed,
}

/// What the caller should do after the vault came back to the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundAction {
    None,
    /// Withdraw the notification posted by [`BackgroundAction::NotifyToClose`].
    DismissNotification,
}

/// One vault, locked or unlocked.
pub struct VaultSession {
    handle: SessionHandle,
    config: VaultConfig,
    store: Arc<dyn ContentStore>,
    key: Option<VaultKey>,
    tree: Option<FileTree>,
    state: VaultState,
}

impl VaultSession {
    pub(crate) fn locked(config: VaultConfig, store: Arc<dyn ContentStore>) -> Self {
        Self {
            handle: SessionHandle::new(),
            config,
            store,
            key: None,
            tree: None,
            state: VaultState::Locked,
        }
    }

    pub(crate) fn unlocked(
        config: VaultConfig,
        store: Arc<dyn ContentStore>,
        key: VaultKey,
        tree: FileTree,
    ) -> Self {
        Self {
            handle: SessionHandle::new(),
            config,
            store,
            key: Some(key),
            tree: Some(tree),
            state: VaultState::Unlocked,
        }
    }

    /// Get the session handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Get the vault ID.
    pub fn vault_id(&self) -> &VaultId {
        &self.config.id
    }

    /// Get the vault configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Get the content store.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Get the current state.
    pub fn state(&self) -> VaultState {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == VaultState::Unlocked
    }

    /// The configured unlock mechanism.
    pub fn mechanism(&self) -> Result<UnlockMechanism> {
        self.config.mechanism()
    }

    /// Get the vault key, if unlocked.
    ///
    /// # Errors
    /// - `NotPermitted` unless the session is unlocked
    pub fn key(&self) -> Result<&VaultKey> {
        match (self.state, self.key.as_ref()) {
            (VaultState::Unlocked, Some(key)) => Ok(key),
            _ => Err(self.not_unlocked()),
        }
    }

    /// Get the decrypted tree, if unlocked.
    pub fn tree(&self) -> Result<&FileTree> {
        match (self.state, self.tree.as_ref()) {
            (VaultState::Unlocked, Some(tree)) => Ok(tree),
            _ => Err(self.not_unlocked()),
        }
    }

    /// Mutable access to the tree. Changes are not durable until
    /// [`VaultSession::save_tree`] succeeds.
    pub fn tree_mut(&mut self) -> Result<&mut FileTree> {
        match (self.state, self.tree.as_mut()) {
            (VaultState::Unlocked, Some(tree)) => Ok(tree),
            _ => Err(Error::NotPermitted(format!(
                "Vault {} is not unlocked",
                self.config.id
            ))),
        }
    }

    fn not_unlocked(&self) -> Error {
        Error::NotPermitted(format!("Vault {} is not unlocked", self.config.id))
    }

    /// Run the vault's unlock mechanism and try the key it issues.
    ///
    /// # Errors
    /// - `NotPermitted` if the session is closed
    /// - `Credential` if the key does not open the manifest
    /// - Any error of the mechanism (`Cancelled`, `MechanismUnavailable`...)
    pub async fn unlock(&mut self, ctx: &UnlockContext<'_>) -> Result<()> {
        match self.state {
            VaultState::Unlocked => return Ok(()),
            VaultState::Closed => {
                return Err(Error::NotPermitted("Session is closed".to_string()));
            }
            VaultState::Locked | VaultState::Unlocking => {}
        }

        let mechanism = self.mechanism()?;
        let key = mechanism
            .issue_key_at_unlock(&self.config.id, &self.config.additional_unlock_data, ctx)
            .await?;
        self.try_unlock(key)
    }

    /// Unlock with a key obtained elsewhere.
    ///
    /// On failure the session stays locked and no tree is exposed.
    pub fn try_unlock(&mut self, key: VaultKey) -> Result<()> {
        if self.state == VaultState::Closed {
            return Err(Error::NotPermitted("Session is closed".to_string()));
        }

        self.state = VaultState::Unlocking;
        match self.load_tree(&key) {
            Ok(tree) => {
                self.key = Some(key);
                self.tree = Some(tree);
                self.state = VaultState::Unlocked;
                info!(vault_id = %self.config.id, "Vault unlocked");
                Ok(())
            }
            Err(e) => {
                self.state = VaultState::Locked;
                warn!(vault_id = %self.config.id, error = %e, "Unlock failed");
                Err(e)
            }
        }
    }

    /// Whether `key` authenticates, decrypts and parses the manifest.
    pub fn test_key(&self, key: &VaultKey) -> bool {
        self.load_tree(key).is_ok()
    }

    fn load_tree(&self, key: &VaultKey) -> Result<FileTree> {
        let sealed = self
            .store
            .read_metadata(&self.config.id, &self.config.manifest_filename())?;

        let ciphertext = mac::open(key, &sealed)?;
        let json = decrypt_utf8(key, &self.config.file_tree_iv, ciphertext)
            .map_err(|_| Error::Credential("Key does not decrypt the manifest".to_string()))?;
        let tree = FileTree::from_json(&json)
            .map_err(|_| Error::Credential("Key does not decrypt the manifest".to_string()))?;

        debug!(vault_id = %self.config.id, files = tree.count(), "Manifest loaded");
        Ok(tree)
    }

    /// Encrypt and persist the in-memory tree.
    ///
    /// The manifest is always encrypted under the vault's fixed
    /// `file_tree_iv`, so successive manifests share a keystream. An
    /// HMAC-SHA256 tag over the ciphertext is appended to the file.
    pub fn save_tree(&self) -> Result<()> {
        let key = self.key()?;
        let json = self.tree()?.to_json()?;
        let ciphertext = encrypt_utf8(key, &self.config.file_tree_iv, &json)?;
        self.store.write_metadata(
            &self.config.id,
            &self.config.manifest_filename(),
            &mac::seal(key, ciphertext)?,
        )?;
        debug!(vault_id = %self.config.id, "Manifest saved");
        Ok(())
    }

    /// Persist the plaintext config.
    pub fn save_config(&self) -> Result<()> {
        self.store
            .write_metadata(&self.config.id, CONFIG_FILENAME, &self.config.to_bytes()?)
    }

    /// Drop the key and tree, keeping the session reusable.
    pub fn lock(&mut self) {
        self.key = None;
        self.tree = None;
        if self.state != VaultState::Closed {
            self.state = VaultState::Locked;
            info!(vault_id = %self.config.id, "Vault locked");
        }
    }

    /// Drop the key and tree for good.
    pub fn close(&mut self) {
        self.key = None;
        self.tree = None;
        if self.state != VaultState::Closed {
            self.state = VaultState::Closed;
            info!(vault_id = %self.config.id, "Vault closed");
        }
    }

    /// Rename the vault.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Vault name cannot be empty".to_string()));
        }
        self.config.name = name;
        self.save_config()
    }

    pub fn set_encryption_level(&mut self, level: EncryptionLevel) -> Result<()> {
        self.config.encryption_level = level;
        self.save_config()
    }

    pub fn set_sort_method(&mut self, method: SortMethod) -> Result<()> {
        self.config.sort_method = method;
        self.save_config()
    }

    /// Apply the closure policy when the vault leaves the foreground.
    pub fn on_background(&mut self) -> BackgroundAction {
        if !self.is_unlocked() {
            return BackgroundAction::None;
        }
        match self.config.encryption_level {
            EncryptionLevel::Never => BackgroundAction::None,
            EncryptionLevel::AskToClose => BackgroundAction::NotifyToClose,
            EncryptionLevel::CloseImmediately => {
                self.close();
                BackgroundAction::Closed
            }
        }
    }

    /// Apply the closure policy when the vault is shown again.
    pub fn on_foreground(&self) -> ForegroundAction {
        match (self.state, self.config.encryption_level) {
            (VaultState::Unlocked, EncryptionLevel::AskToClose) => {
                ForegroundAction::DismissNotification
            }
            _ => ForegroundAction::None,
        }
    }

    /// Random-access reader over the current tree.
    pub fn content_resolver(&self) -> Result<ContentResolver> {
        ContentResolver::new(self)
    }

    /// File and directory operations.
    pub fn operations(&mut self) -> Result<VaultOperations<'_>> {
        VaultOperations::new(self)
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        self.key = None;
        self.tree = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DirectoryNode;
    use lifechest_storage::MemoryStore;

    fn create_test_session(level: EncryptionLevel) -> (VaultSession, VaultKey) {
        let store = Arc::new(MemoryStore::new());
        let config = VaultConfig::new(
            VaultId::new("5e55").unwrap(),
            "Test",
            level,
            UnlockMechanism::Pin,
            1,
        );
        store.create_vault_dir(&config.id).unwrap();

        let key = VaultKey::generate();
        let tree = FileTree::new(DirectoryNode::new("Test"));
        let session = VaultSession::unlocked(config, store, key.clone(), tree);
        session.save_tree().unwrap();
        session.save_config().unwrap();
        (session, key)
    }

    fn relocked(session: &VaultSession) -> VaultSession {
        VaultSession::locked(session.config().clone(), session.store().clone())
    }

    #[test]
    fn test_session_unlocked() {
        let (session, _) = create_test_session(EncryptionLevel::Never);
        assert!(session.is_unlocked());
        assert!(session.key().is_ok());
        assert_eq!(session.tree().unwrap().count(), 0);
    }

    #[test]
    fn test_lock_clears_key_and_tree() {
        let (mut session, _) = create_test_session(EncryptionLevel::Never);
        session.lock();

        assert_eq!(session.state(), VaultState::Locked);
        assert!(matches!(session.key(), Err(Error::NotPermitted(_))));
        assert!(session.tree().is_err());
    }

    #[test]
    fn test_try_unlock() {
        let (session, key) = create_test_session(EncryptionLevel::Never);
        let mut locked = relocked(&session);

        let wrong = locked.try_unlock(VaultKey::generate());
        assert!(matches!(wrong, Err(Error::Credential(_))));
        assert_eq!(locked.state(), VaultState::Locked);
        assert!(locked.tree().is_err());

        locked.try_unlock(key).unwrap();
        assert!(locked.is_unlocked());
        assert_eq!(locked.tree().unwrap(), session.tree().unwrap());
    }

    #[test]
    fn test_key_check_on_corrupted_manifest() {
        let (session, key) = create_test_session(EncryptionLevel::Never);
        assert!(session.test_key(&key));
        assert!(!session.test_key(&VaultKey::generate()));

        let store = session.store();
        let name = session.config().manifest_filename();
        let sealed = store.read_metadata(session.vault_id(), &name).unwrap();
        for index in [0, sealed.len() / 2, sealed.len() - 1] {
            let mut tampered = sealed.clone();
            tampered[index] ^= 0x01;
            store
                .write_metadata(session.vault_id(), &name, &tampered)
                .unwrap();
            assert!(!session.test_key(&key), "byte {}", index);
        }
    }

    #[test]
    fn test_flipped_byte_inside_root_name_is_detected() {
        let store = Arc::new(MemoryStore::new());
        let config = VaultConfig::new(
            VaultId::new("5e56").unwrap(),
            "TestVaultNameLong",
            EncryptionLevel::Never,
            UnlockMechanism::Pin,
            1,
        );
        store.create_vault_dir(&config.id).unwrap();
        let key = VaultKey::generate();
        let tree = FileTree::new(DirectoryNode::new("TestVaultNameLong"));
        let session = VaultSession::unlocked(config, store.clone(), key.clone(), tree);
        session.save_tree().unwrap();

        let name = session.config().manifest_filename();
        let json = session.tree().unwrap().to_json().unwrap();
        let position = json.find("TestVaultNameLong").unwrap() + 8;
        let mut sealed = store.read_metadata(session.vault_id(), &name).unwrap();
        sealed[position] ^= 0x01;
        store
            .write_metadata(session.vault_id(), &name, &sealed)
            .unwrap();

        assert!(!session.test_key(&key));
        let mut locked = relocked(&session);
        assert!(matches!(locked.try_unlock(key), Err(Error::Credential(_))));
        assert_eq!(locked.state(), VaultState::Locked);
    }

    #[test]
    fn test_closed_session_cannot_unlock() {
        let (mut session, key) = create_test_session(EncryptionLevel::Never);
        session.close();

        assert_eq!(session.state(), VaultState::Closed);
        assert!(matches!(
            session.try_unlock(key),
            Err(Error::NotPermitted(_))
        ));
    }

    #[test]
    fn test_background_policy() {
        let (mut never, _) = create_test_session(EncryptionLevel::Never);
        assert_eq!(never.on_background(), BackgroundAction::None);
        assert!(never.is_unlocked());

        let (mut ask, _) = create_test_session(EncryptionLevel::AskToClose);
        assert_eq!(ask.on_background(), BackgroundAction::NotifyToClose);
        assert_eq!(ask.on_foreground(), ForegroundAction::DismissNotification);
        assert!(ask.is_unlocked());

        let (mut immediate, _) = create_test_session(EncryptionLevel::CloseImmediately);
        assert_eq!(immediate.on_background(), BackgroundAction::Closed);
        assert_eq!(immediate.state(), VaultState::Closed);
        assert!(immediate.key().is_err());
        assert_eq!(immediate.on_foreground(), ForegroundAction::None);
    }

    #[test]
    fn test_edits_persist_config() {
        let (mut session, _) = create_test_session(EncryptionLevel::Never);
        session.rename("Renamed").unwrap();
        session.set_encryption_level(EncryptionLevel::AskToClose).unwrap();
        session.set_sort_method(SortMethod::SizeReverse).unwrap();
        assert!(session.rename("  ").is_err());

        let bytes = session
            .store()
            .read_metadata(session.vault_id(), CONFIG_FILENAME)
            .unwrap();
        let stored = VaultConfig::from_bytes(&bytes).unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.encryption_level, EncryptionLevel::AskToClose);
        assert_eq!(stored.sort_method, SortMethod::SizeReverse);
    }
}
