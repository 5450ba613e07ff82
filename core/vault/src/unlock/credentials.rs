//! Seam through which the user interface supplies secrets.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::UnlockMechanism;
use lifechest_common::{SensitiveBytes, VaultId};

/// Why a secret is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPurpose {
    /// Choosing the secret of a new vault.
    Create,
    /// Opening an existing vault.
    Unlock,
}

/// What the prompt is for.
#[derive(Debug, Clone, Copy)]
pub struct CredentialRequest<'a> {
    pub vault_id: &'a VaultId,
    pub vault_name: Option<&'a str>,
    pub mechanism: UnlockMechanism,
    pub purpose: CredentialPurpose,
}

/// Source of user secrets (PIN pad, passphrase field, terminal prompt).
///
/// Returning `None` means the user dismissed the prompt.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn request_secret(&self, request: &CredentialRequest<'_>) -> Option<SensitiveBytes>;
}

/// Credential source answering from a fixed queue of secrets.
///
/// Each request pops the next secret; the last one is repeated. An empty
/// queue dismisses every prompt.
pub struct StaticCredentials {
    secrets: Mutex<VecDeque<SensitiveBytes>>,
}

impl StaticCredentials {
    /// Always answer with `secret`.
    pub fn new(secret: impl Into<SensitiveBytes>) -> Self {
        Self::sequence([secret.into()])
    }

    /// Answer with each secret in turn.
    pub fn sequence(secrets: impl IntoIterator<Item = SensitiveBytes>) -> Self {
        Self {
            secrets: Mutex::new(secrets.into_iter().collect()),
        }
    }

    /// Dismiss every prompt.
    pub fn refusing() -> Self {
        Self::sequence([])
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn request_secret(&self, _request: &CredentialRequest<'_>) -> Option<SensitiveBytes> {
        let mut secrets = self.secrets.lock().ok()?;
        if secrets.len() > 1 {
            secrets.pop_front()
        } else {
            secrets.front().cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(vault_id: &VaultId) -> CredentialRequest<'_> {
        CredentialRequest {
            vault_id,
            vault_name: None,
            mechanism: UnlockMechanism::Pin,
            purpose: CredentialPurpose::Unlock,
        }
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let id = VaultId::new("aa").unwrap();
        let source = StaticCredentials::sequence(["1".into(), "2".into()]);

        let first = source.request_secret(&request(&id)).await.unwrap();
        let second = source.request_secret(&request(&id)).await.unwrap();
        let third = source.request_secret(&request(&id)).await.unwrap();

        assert_eq!(first.as_str(), Some("1"));
        assert_eq!(second.as_str(), Some("2"));
        assert_eq!(third.as_str(), Some("2"));
    }

    #[tokio::test]
    async fn test_refusing() {
        let id = VaultId::new("aa").unwrap();
        assert!(StaticCredentials::refusing()
            .request_secret(&request(&id))
            .await
            .is_none());
    }
}
