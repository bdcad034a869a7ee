//! On-disk manager configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use skm_common::{Error, Result};
use skm_providers::paths::APP_DIR;
use skm_providers::{BuiltinConfig, ConflictPolicy, ProviderRegistry};

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV_VAR: &str = "SKM_CONFIG";

/// Per-provider overrides applied after the built-ins are registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Manager configuration.
///
/// Every field has a default, so an empty object (or a missing file) yields
/// the stock setup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Reject duplicate provider names instead of replacing.
    pub strict_registration: bool,
    /// Per-provider call budget in seconds; `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub providers: BTreeMap<String, ProviderOverride>,
    pub builtins: BuiltinConfig,
}

impl ManagerConfig {
    /// `<config dir>/secret_key_manager/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Pick the configuration file: explicit path, then `SKM_CONFIG`, then
    /// the default location.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::default_path(),
        }
    }

    /// Load configuration from `path`.
    ///
    /// # Errors
    /// - Unreadable file
    /// - Malformed JSON
    pub async fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path).await {
            Ok(content) => Self::from_json(&content).map_err(|e| {
                Error::Config(format!("invalid configuration {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write configuration to `path`, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(path, self.to_json()?).await?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        if self.strict_registration {
            ConflictPolicy::Reject
        } else {
            ConflictPolicy::Replace
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Record an enabled flag for `name`, keeping any priority override.
    pub fn set_provider_enabled(&mut self, name: &str, enabled: bool) {
        self.providers.entry(name.to_string()).or_default().enabled = Some(enabled);
    }

    /// Apply per-provider overrides to `registry`.
    ///
    /// Overrides naming unregistered providers are logged and ignored; their
    /// names are returned.
    pub fn apply_overrides(&self, registry: &ProviderRegistry) -> Vec<String> {
        let mut unknown = Vec::new();
        for (name, ov) in &self.providers {
            if !registry.contains(name) {
                warn!(provider = %name, "Configuration names an unregistered provider");
                unknown.push(name.clone());
                continue;
            }
            if let Some(priority) = ov.priority {
                registry.set_priority(name, priority);
            }
            if let Some(enabled) = ov.enabled {
                registry.set_enabled(name, enabled);
            }
        }
        unknown
    }
}
