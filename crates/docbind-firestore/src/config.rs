use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DATABASE: &str = "(default)";
pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Connection settings for the Firestore REST API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirestoreConfig {
    pub project_id: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Web API key, sent as the `key` query parameter
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: default_database(),
            api_key: None,
            base_url: default_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    /// Load settings from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read Firestore config {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse Firestore config {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: FirestoreConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from `FIRESTORE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from a variable lookup. `FIRESTORE_PROJECT_ID` is
    /// required; everything else falls back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let project_id =
            lookup("FIRESTORE_PROJECT_ID").context("FIRESTORE_PROJECT_ID is not set")?;
        let mut config = Self::new(project_id);

        if let Some(database) = lookup("FIRESTORE_DATABASE") {
            config.database = database;
        }
        config.api_key = lookup("FIRESTORE_API_KEY").filter(|key| !key.is_empty());
        if let Some(base_url) = lookup("FIRESTORE_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(interval) = lookup("FIRESTORE_POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval.trim().parse().with_context(|| {
                format!("FIRESTORE_POLL_INTERVAL_MS is not a number: '{}'", interval)
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            anyhow::bail!("Firestore project_id must not be empty");
        }
        if self.database.trim().is_empty() {
            anyhow::bail!("Firestore database must not be empty");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("Firestore poll_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
