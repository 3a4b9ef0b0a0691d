use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "causeboard";

/// Bearer tokens kept in the OS keychain, one per account email.
pub struct CredentialStore;

impl CredentialStore {
    fn entry(username: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, username)
            .with_context(|| format!("Failed to open keychain entry for {}", username))
    }

    pub fn store_token(username: &str, token: &str) -> Result<()> {
        Self::entry(username)?
            .set_password(token)
            .context("Failed to store session token in keychain")
    }

    pub fn get_token(username: &str) -> Result<String> {
        Self::entry(username)?
            .get_password()
            .context("No session token in keychain")
    }

    /// Forget the token; signing out twice is not an error.
    pub fn delete(username: &str) -> Result<()> {
        match Self::entry(username)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session token from keychain"),
        }
    }
}
