//! Unlock mechanisms: how a user credential becomes the vault key.
//!
//! The set of mechanisms is closed. Each is persisted by its string id in
//! the vault config and keeps whatever it needs to reproduce the key in the
//! config's auxiliary data. None of them stores a key witness: the key is
//! verified by decrypting the manifest.

pub mod credentials;
pub mod secure_element;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

pub use credentials::{CredentialPurpose, CredentialRequest, CredentialSource, StaticCredentials};
pub use secure_element::{SecureElement, SoftwareSecureElement};

use crate::config::VaultConfig;
use lifechest_common::{Error, Result, SensitiveBytes, VaultId};
use lifechest_crypto::{derive_key, VaultKey, WrappedKey};

/// Auxiliary data key holding the wrapped content key.
pub const ENCRYPTED_KEY: &str = "encryptedKey";
/// Auxiliary data key holding the wrapping nonce.
pub const WRAP_IV: &str = "iv";

/// Minimum passphrase length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 10;
/// Exact PIN length.
pub const PIN_LENGTH: usize = 4;

const PIN_DENYLIST: [&str; 12] = [
    "1234", "4321", "0000", "1111", "2222", "3333", "4444", "5555", "6666", "7777", "8888",
    "9999",
];

/// Collaborators a mechanism may need to issue a key.
#[derive(Clone, Copy)]
pub struct UnlockContext<'a> {
    pub credentials: &'a dyn CredentialSource,
    pub secure_element: Option<&'a dyn SecureElement>,
}

impl<'a> UnlockContext<'a> {
    pub fn new(credentials: &'a dyn CredentialSource) -> Self {
        Self {
            credentials,
            secure_element: None,
        }
    }

    pub fn with_secure_element(mut self, element: &'a dyn SecureElement) -> Self {
        self.secure_element = Some(element);
        self
    }

    fn secure_element(&self) -> Result<&'a dyn SecureElement> {
        self.secure_element
            .filter(|element| element.is_available())
            .ok_or_else(|| {
                Error::MechanismUnavailable("No secure element on this device".to_string())
            })
    }
}

/// The available unlock mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnlockMechanism {
    /// Passphrase hashed into the key.
    Password,
    /// Four-digit PIN hashed into the key.
    Pin,
    /// Random key sealed by a hardware secure element.
    Biometric,
}

impl UnlockMechanism {
    pub const ALL: [UnlockMechanism; 3] = [
        UnlockMechanism::Password,
        UnlockMechanism::Pin,
        UnlockMechanism::Biometric,
    ];

    /// Identifier persisted in the vault config.
    pub fn id(&self) -> &'static str {
        match self {
            UnlockMechanism::Password => "password",
            UnlockMechanism::Pin => "pin",
            UnlockMechanism::Biometric => "biometric",
        }
    }

    /// Parse a persisted identifier.
    pub fn from_id(id: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mechanism| mechanism.id() == id)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown unlock mechanism: {}", id)))
    }

    /// Whether files of such a vault can be exported.
    ///
    /// A recipient must be able to rerun the mechanism; a device-bound key
    /// cannot be rerun anywhere else.
    pub fn supports_export(&self) -> bool {
        !matches!(self, UnlockMechanism::Biometric)
    }

    /// Whether the mechanism can be offered with these collaborators.
    pub fn is_available(&self, ctx: &UnlockContext<'_>) -> bool {
        match self {
            UnlockMechanism::Password | UnlockMechanism::Pin => true,
            UnlockMechanism::Biometric => ctx.secure_element().is_ok(),
        }
    }

    /// Check a new secret against the strength rules.
    ///
    /// Only applied when a vault is created.
    pub fn validate_secret(&self, secret: &str) -> Result<()> {
        match self {
            UnlockMechanism::Password => validate_password(secret),
            UnlockMechanism::Pin => validate_pin(secret),
            UnlockMechanism::Biometric => Ok(()),
        }
    }

    /// Produce the key of a vault being created.
    ///
    /// Stores in `config` whatever [`UnlockMechanism::issue_key_at_unlock`]
    /// will need to reproduce the same key.
    ///
    /// # Errors
    /// - `Cancelled` if the user dismissed the prompt
    /// - `InvalidInput` if the secret is too weak
    /// - `MechanismUnavailable` without a usable secure element
    pub async fn issue_key_at_creation(
        &self,
        config: &mut VaultConfig,
        ctx: &UnlockContext<'_>,
    ) -> Result<VaultKey> {
        match self {
            UnlockMechanism::Password | UnlockMechanism::Pin => {
                let secret = self
                    .request(ctx, &config.id, Some(&config.name), CredentialPurpose::Create)
                    .await?;
                let text = secret
                    .as_str()
                    .ok_or_else(|| Error::InvalidInput("Secret is not valid UTF-8".to_string()))?;
                self.validate_secret(text)?;
                derive_key(secret.as_bytes())
            }
            UnlockMechanism::Biometric => {
                let element = ctx.secure_element()?;
                let alias = config.id.as_str();
                element.generate_key(alias).await?;

                let key = VaultKey::generate();
                let wrapped = element.wrap(alias, &key).await?;
                config
                    .additional_unlock_data
                    .insert(ENCRYPTED_KEY.to_string(), wrapped.ciphertext);
                config
                    .additional_unlock_data
                    .insert(WRAP_IV.to_string(), wrapped.nonce.to_vec());
                debug!(vault_id = %config.id, "Sealed vault key in secure element");
                Ok(key)
            }
        }
    }

    /// Reproduce the key of an existing vault.
    ///
    /// The key is not verified here; a wrong PIN yields a wrong key that
    /// fails manifest decryption later.
    ///
    /// # Errors
    /// - `Cancelled` if the user dismissed the prompt
    /// - `Corruption` if required auxiliary data is missing
    /// - `Credential` if the secure element refuses the sealed key
    pub async fn issue_key_at_unlock(
        &self,
        vault_id: &VaultId,
        additional_unlock_data: &BTreeMap<String, Vec<u8>>,
        ctx: &UnlockContext<'_>,
    ) -> Result<VaultKey> {
        match self {
            UnlockMechanism::Password | UnlockMechanism::Pin => {
                let secret = self
                    .request(ctx, vault_id, None, CredentialPurpose::Unlock)
                    .await?;
                derive_key(secret.as_bytes())
            }
            UnlockMechanism::Biometric => {
                let element = ctx.secure_element()?;
                let aux = |name: &str| {
                    additional_unlock_data.get(name).ok_or_else(|| {
                        Error::Corruption(format!("Missing unlock data: {}", name))
                    })
                };
                let wrapped = WrappedKey::from_parts(aux(ENCRYPTED_KEY)?.clone(), aux(WRAP_IV)?)
                    .map_err(|e| Error::Corruption(e.to_string()))?;

                element
                    .unwrap(vault_id.as_str(), &wrapped)
                    .await
                    .map_err(|e| match e {
                        Error::Crypto(msg) => Error::Credential(msg),
                        other => other,
                    })
            }
        }
    }

    /// Remove any state the mechanism keeps outside the vault directory.
    ///
    /// # Errors
    /// - `MechanismUnavailable` for a biometric vault when no secure element
    ///   is present, since its key could not be removed
    pub fn delete_state(&self, vault_id: &VaultId, ctx: &UnlockContext<'_>) -> Result<()> {
        match self {
            UnlockMechanism::Password | UnlockMechanism::Pin => Ok(()),
            UnlockMechanism::Biometric => match ctx.secure_element {
                Some(element) => element.delete_key(vault_id.as_str()),
                None => Err(Error::MechanismUnavailable(format!(
                    "No secure element to remove the key of vault {}",
                    vault_id
                ))),
            },
        }
    }

    async fn request(
        &self,
        ctx: &UnlockContext<'_>,
        vault_id: &VaultId,
        vault_name: Option<&str>,
        purpose: CredentialPurpose,
    ) -> Result<SensitiveBytes> {
        let request = CredentialRequest {
            vault_id,
            vault_name,
            mechanism: *self,
            purpose,
        };
        let secret = ctx
            .credentials
            .request_secret(&request)
            .await
            .ok_or_else(|| Error::Cancelled("Credential prompt dismissed".to_string()))?;
        if secret.is_empty() {
            return Err(Error::InvalidInput("Secret cannot be empty".to_string()));
        }
        Ok(secret)
    }
}

impl fmt::Display for UnlockMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for UnlockMechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_id(s)
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::InvalidInput(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        )));
    }

    let has_lower = password.chars().any(char::is_lowercase);
    let has_upper = password.chars().any(char::is_uppercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_other = password
        .chars()
        .any(|c| !c.is_lowercase() && !c.is_uppercase() && !c.is_ascii_digit());

    let missing = [
        (has_lower, "a lowercase letter"),
        (has_upper, "an uppercase letter"),
        (has_digit, "a digit"),
        (has_other, "a special character"),
    ]
    .into_iter()
    .find(|(present, _)| !present);

    match missing {
        Some((_, what)) => Err(Error::InvalidInput(format!(
            "Password must contain at least {}",
            what
        ))),
        None => Ok(()),
    }
}

fn validate_pin(pin: &str) -> Result<()> {
    if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!(
            "PIN must be exactly {} digits",
            PIN_LENGTH
        )));
    }
    if PIN_DENYLIST.contains(&pin) {
        return Err(Error::InvalidInput("PIN is too easy to guess".to_string()));
    }
    Ok(())
}
