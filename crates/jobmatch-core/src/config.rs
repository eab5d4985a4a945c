//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: which
//! API to talk to, where the bearer token is persisted, and the last
//! identifier used to sign in.
//!
//! Configuration is stored at `~/.config/jobmatch/config.json`. The
//! `JOBMATCH_API_URL` and `JOBMATCH_CREDENTIAL_BACKEND` environment
//! variables override the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::ApiClient;
use crate::auth::{CredentialStore, FileStore, KeyringStore, SessionManager, SessionOptions};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "jobmatch";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

const ENV_API_URL: &str = "JOBMATCH_API_URL";
const ENV_CREDENTIAL_BACKEND: &str = "JOBMATCH_CREDENTIAL_BACKEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    Keyring,
    #[default]
    File,
}

impl CredentialBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyring" => Some(Self::Keyring),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub credential_backend: CredentialBackend,
    /// Client-side request limit; unset leaves timing to the API
    pub request_timeout_secs: Option<u64>,
    pub restore_retries: u32,
    pub last_identifier: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            credential_backend: CredentialBackend::default(),
            request_timeout_secs: None,
            restore_retries: 0,
            last_identifier: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if missing), then apply environment
    /// overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Record the identifier of the last successful sign-in. Only that
    /// field is written back; environment overrides stay out of the file.
    pub fn remember_identifier(&mut self, identifier: &str) -> Result<()> {
        self.last_identifier = Some(identifier.to_string());
        let path = Self::config_path()?;
        let mut stored = Self::load_from(&path)?;
        stored.last_identifier = self.last_identifier.clone();
        stored.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(value) = lookup(ENV_CREDENTIAL_BACKEND) {
            match CredentialBackend::parse(&value) {
                Some(backend) => self.credential_backend = backend,
                None => warn!(value = %value, "Unknown credential backend, keeping configured one"),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            restore_retries: self.restore_retries,
            ..SessionOptions::default()
        }
    }

    /// The configured credential backend
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        Ok(match self.credential_backend {
            CredentialBackend::Keyring => Arc::new(KeyringStore::new()),
            CredentialBackend::File => Arc::new(FileStore::new(self.cache_dir()?)),
        })
    }

    /// Build the HTTP client and a session over the configured store.
    /// The session is not restored yet.
    pub fn open_session(&self) -> Result<SessionManager> {
        let client = ApiClient::new(&self.api_base_url, self.request_timeout())
            .context("Failed to create API client")?;
        Ok(SessionManager::new(client, self.credential_store()?, self.session_options()))
    }
}
