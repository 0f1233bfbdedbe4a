//! Application configuration management.
//!
//! `Settings` is what a [`GraphSession`](crate::GraphSession) is initialized
//! with: the app registration's client id, the tenant, and the scopes to ask
//! for. `Config` is the on-disk file those settings come from, stored at
//! `~/.config/graphdesk/config.json`, with `GRAPHDESK_*` environment
//! variables taking precedence over the file.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "graphdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Tenant used when none is configured; accepts work, school and personal accounts
pub const DEFAULT_TENANT: &str = "common";

/// Scopes needed by every operation graphdesk offers
pub const DEFAULT_SCOPES: &[&str] = &["user.read", "mail.read", "mail.send", "calendars.readwrite"];

pub const ENV_CLIENT_ID: &str = "GRAPHDESK_CLIENT_ID";
pub const ENV_TENANT_ID: &str = "GRAPHDESK_TENANT_ID";
pub const ENV_SCOPES: &str = "GRAPHDESK_SCOPES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "graphUserScopes", default)]
    pub graph_user_scopes: Vec<String>,
}

impl Settings {
    pub fn new(client_id: &str, tenant_id: &str, graph_user_scopes: Vec<String>) -> Self {
        Self {
            client_id: client_id.to_string(),
            tenant_id: tenant_id.to_string(),
            graph_user_scopes,
        }
    }

    /// Turn "no settings could be resolved" into the initialization error
    pub fn require(settings: Option<Settings>) -> Result<Settings, SessionError> {
        settings.ok_or_else(|| SessionError::Config("Settings cannot be undefined".to_string()))
    }

    /// Check the identifiers needed to build a credential.
    ///
    /// Empty scopes are allowed here; they are only rejected when a token is
    /// requested.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.client_id.trim().is_empty() {
            return Err(SessionError::Config("Setting \"clientId\" cannot be empty".to_string()));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(SessionError::Config("Setting \"tenantId\" cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Split a scope list given as one string, separated by commas and/or whitespace
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub graph_user_scopes: Option<Vec<String>>,
    #[serde(default)]
    pub last_recipient: Option<String>,
    /// Keep the refresh token in the OS keychain between runs
    #[serde(default = "default_remember_login")]
    pub remember_login: bool,
}

fn default_remember_login() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            tenant_id: None,
            graph_user_scopes: None,
            last_recipient: None,
            remember_login: default_remember_login(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Overlay `GRAPHDESK_*` environment variables on top of the file values
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(client_id) = non_empty(ENV_CLIENT_ID) {
            self.client_id = Some(client_id.trim().to_string());
        }
        if let Some(tenant_id) = non_empty(ENV_TENANT_ID) {
            self.tenant_id = Some(tenant_id.trim().to_string());
        }
        if let Some(scopes) = non_empty(ENV_SCOPES) {
            self.graph_user_scopes = Some(parse_scopes(&scopes));
        }
    }

    /// Resolve session settings, or `None` when no client id is configured.
    ///
    /// Tenant and scopes fall back to [`DEFAULT_TENANT`] and [`DEFAULT_SCOPES`].
    pub fn settings(&self) -> Option<Settings> {
        let client_id = self.client_id.as_deref().filter(|id| !id.trim().is_empty())?;
        let tenant_id = self.tenant_id.as_deref().unwrap_or(DEFAULT_TENANT);
        let scopes = self
            .graph_user_scopes
            .clone()
            .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect());
        Some(Settings::new(client_id, tenant_id, scopes))
    }
}
