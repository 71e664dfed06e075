//! Secure password storage using the OS keyring.
//!
//! MPD passwords are kept out of `config.toml` when possible. Each server gets
//! its own entry under the "pms" service, keyed by `host:port`.

use thiserror::Error;

/// Service name used for all pms credentials in the OS keyring.
const SERVICE_NAME: &str = "pms";

/// Errors that can occur when accessing the credential store.
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("credential not found: {key}")]
    NotFound { key: String },

    #[error("keyring access denied: {0}")]
    AccessDenied(String),

    #[error("keyring unavailable: {0}")]
    Unavailable(String),

    #[error("keyring error: {0}")]
    Other(String),
}

impl From<keyring::Error> for SecretsError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => SecretsError::NotFound {
                key: "unknown".into(),
            },
            keyring::Error::NoStorageAccess(e) => SecretsError::AccessDenied(e.to_string()),
            keyring::Error::PlatformFailure(e) => SecretsError::Unavailable(e.to_string()),
            other => SecretsError::Other(other.to_string()),
        }
    }
}

pub type SecretsResult<T> = Result<T, SecretsError>;

/// Credential store backed by the OS keyring.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    service: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.into(),
        }
    }

    fn build_key(host: &str, port: u16) -> String {
        format!("{}:{}/password", host, port)
    }

    /// Store the password for an MPD server.
    pub fn store_password(&self, host: &str, port: u16, password: &str) -> SecretsResult<()> {
        let key = Self::build_key(host, port);
        let entry = keyring::Entry::new(&self.service, &key)?;
        entry.set_password(password)?;
        tracing::debug!(host, port, "stored MPD password in keyring");
        Ok(())
    }

    /// Retrieve the password for an MPD server.
    ///
    /// Returns `SecretsError::NotFound` if no password was stored.
    pub fn password(&self, host: &str, port: u16) -> SecretsResult<String> {
        let key = Self::build_key(host, port);
        let entry = keyring::Entry::new(&self.service, &key)?;
        match entry.get_password() {
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => Err(SecretsError::NotFound { key }),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`CredentialStore::password`], but a missing entry is `Ok(None)`.
    pub fn find_password(&self, host: &str, port: u16) -> SecretsResult<Option<String>> {
        match self.password(host, port) {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretsError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete the stored password. Succeeds when nothing was stored.
    pub fn delete_password(&self, host: &str, port: u16) -> SecretsResult<()> {
        let key = Self::build_key(host, port);
        let entry = keyring::Entry::new(&self.service, &key)?;
        match entry.delete_credential() {
            Ok(()) => {
                tracing::debug!(host, port, "deleted MPD password from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
