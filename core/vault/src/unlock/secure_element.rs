//! Hardware-backed key storage seam.
//!
//! A secure element holds key-encryption keys under an alias (the vault
//! id) that never leave it. The platform decides how to authenticate the
//! user before `unwrap` succeeds.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use lifechest_common::{Error, Result};
use lifechest_crypto::{unwrap_key, wrap_key, VaultKey, WrappedKey};

#[async_trait]
pub trait SecureElement: Send + Sync {
    /// Whether the element can be used on this device right now.
    fn is_available(&self) -> bool;

    /// Create a new key under `alias`, replacing any previous one.
    async fn generate_key(&self, alias: &str) -> Result<()>;

    /// Seal `key` with the key stored under `alias`.
    async fn wrap(&self, alias: &str, key: &VaultKey) -> Result<WrappedKey>;

    /// Authenticate the user and open a sealed key.
    async fn unwrap(&self, alias: &str, wrapped: &WrappedKey) -> Result<VaultKey>;

    /// Forget the key stored under `alias`. Missing aliases are not an error.
    fn delete_key(&self, alias: &str) -> Result<()>;
}

/// In-process secure element.
///
/// Keys live in memory only, so wrapped keys do not survive a restart.
/// Meant for tests and hosts without hardware key storage.
pub struct SoftwareSecureElement {
    keys: Mutex<HashMap<String, VaultKey>>,
    available: bool,
}

impl SoftwareSecureElement {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            available: true,
        }
    }

    /// An element that reports itself as absent.
    pub fn unavailable() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            available: false,
        }
    }

    /// Whether a key exists under `alias`.
    pub fn has_key(&self, alias: &str) -> bool {
        self.keys().map(|keys| keys.contains_key(alias)).unwrap_or(false)
    }

    fn keys(&self) -> Result<MutexGuard<'_, HashMap<String, VaultKey>>> {
        self.keys
            .lock()
            .map_err(|_| Error::Storage("Secure element lock poisoned".to_string()))
    }

    fn key_for(&self, alias: &str) -> Result<VaultKey> {
        self.keys()?
            .get(alias)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("No secure element key for {}", alias)))
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.available {
            return Err(Error::MechanismUnavailable(
                "Secure element not available".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SoftwareSecureElement {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureElement for SoftwareSecureElement {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn generate_key(&self, alias: &str) -> Result<()> {
        self.ensure_available()?;
        self.keys()?.insert(alias.to_string(), VaultKey::generate());
        debug!(alias, "Generated secure element key");
        Ok(())
    }

    async fn wrap(&self, alias: &str, key: &VaultKey) -> Result<WrappedKey> {
        self.ensure_available()?;
        wrap_key(&self.key_for(alias)?, key)
    }

    async fn unwrap(&self, alias: &str, wrapped: &WrappedKey) -> Result<VaultKey> {
        self.ensure_available()?;
        unwrap_key(&self.key_for(alias)?, wrapped)
    }

    fn delete_key(&self, alias: &str) -> Result<()> {
        self.keys()?.remove(alias);
        Ok(())
    }
}
