use anyhow::{Context, Result};
use keyring::Entry;

use crate::config::Settings;

const SERVICE_NAME: &str = "graphdesk";

/// Keeps the refresh token in the OS keychain so later runs can sign in
/// without showing a device code again.
#[derive(Debug, Clone)]
pub struct TokenStore {
    account: String,
}

impl TokenStore {
    pub fn new(client_id: &str, tenant_id: &str) -> Self {
        Self {
            account: format!("{}@{}", client_id, tenant_id),
        }
    }

    pub fn for_settings(settings: &Settings) -> Self {
        Self::new(&settings.client_id, &settings.tenant_id)
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }

    /// Store the refresh token in the OS keychain
    pub fn save(&self, refresh_token: &str) -> Result<()> {
        self.entry()?
            .set_password(refresh_token)
            .context("Failed to store refresh token in keychain")?;
        Ok(())
    }

    /// Retrieve the stored refresh token
    pub fn load(&self) -> Result<String> {
        self.entry()?
            .get_password()
            .context("Failed to retrieve refresh token from keychain")
    }

    /// Forget the stored refresh token; nothing stored is not an error
    pub fn clear(&self) -> Result<()> {
        ignore_missing(self.entry()?.delete_credential())
    }
}

fn ignore_missing(result: keyring::Result<()>) -> Result<()> {
    match result {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e).context("Failed to delete refresh token from keychain"),
    }
}
