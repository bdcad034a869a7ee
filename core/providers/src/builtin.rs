//! Built-in provider set and the default registry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::command::{CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use crate::dotenv::DotEnvProvider;
use crate::env::EnvKeyProvider;
use crate::file::FileProvider;
use crate::lastpass::{LastPassProvider, LASTPASS_PROGRAM};
use crate::onepassword::{OnePasswordProvider, OnePasswordSettings, OP_PROGRAM};
use crate::os_keyring::{KeyringProvider, DEFAULT_SERVICE};
use crate::paths::default_key_file;
use crate::registration::Registration;
use crate::registry::{ConflictPolicy, ProviderRegistry};
use crate::vault::{VaultCliProvider, VAULT_PROGRAM};
use skm_common::Result;

/// Names of the built-in providers.
pub mod names {
    pub const ENVIRONMENT: &str = "environment";
    pub const VAULT: &str = "vault";
    pub const DOTENV: &str = "dotenv";
    pub const JSON_FILE: &str = "json_file";
    pub const ONEPASSWORD: &str = "1password";
    pub const YAML_FILE: &str = "yaml_file";
    pub const LASTPASS: &str = "lastpass";
    pub const KEYRING: &str = "keyring";
}

/// Default priorities of the built-in providers.
pub mod priorities {
    pub const ENVIRONMENT: i64 = 10;
    pub const VAULT: i64 = 20;
    pub const DOTENV: i64 = 25;
    pub const JSON_FILE: i64 = 30;
    pub const ONEPASSWORD: i64 = 30;
    pub const YAML_FILE: i64 = 40;
    pub const LASTPASS: i64 = 40;
    pub const KEYRING: i64 = 50;
}

/// Construction settings for the built-in providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuiltinConfig {
    pub dotenv_path: PathBuf,
    pub json_path: PathBuf,
    pub yaml_path: PathBuf,
    pub keyring_service: String,
    pub onepassword: OnePasswordSettings,
    /// Time budget for each CLI invocation by CLI-backed providers.
    pub command_timeout_secs: u64,
    /// Skip CLI-backed providers whose program is not on `PATH`.
    pub require_installed_commands: bool,
}

impl Default for BuiltinConfig {
    fn default() -> Self {
        Self {
            dotenv_path: PathBuf::from(".env"),
            json_path: default_key_file("keys.json"),
            yaml_path: default_key_file("keys.yaml"),
            keyring_service: DEFAULT_SERVICE.to_string(),
            onepassword: OnePasswordSettings::default(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
            require_installed_commands: true,
        }
    }
}

impl BuiltinConfig {
    fn runner(&self) -> CommandRunner {
        CommandRunner::new(Duration::from_secs(self.command_timeout_secs))
    }

    fn command_usable(&self, program: &str) -> bool {
        if !self.require_installed_commands || CommandRunner::is_installed(program) {
            return true;
        }
        debug!(program, "Command not installed, skipping provider");
        false
    }
}

/// Register every built-in provider into `registry`.
///
/// Registration order (which also breaks priority ties): environment, vault,
/// dotenv, json_file, 1password, yaml_file, lastpass, keyring.
///
/// # Errors
/// - Registry rejection (e.g. a name already taken under strict policy)
pub fn register_builtin_providers(
    registry: &ProviderRegistry,
    config: &BuiltinConfig,
) -> Result<()> {
    Registration::<EnvKeyProvider>::of()
        .name(names::ENVIRONMENT)
        .priority(priorities::ENVIRONMENT)
        .register(registry)?;

    if config.command_usable(VAULT_PROGRAM) {
        Registration::new(VaultCliProvider::new(config.runner()))
            .name(names::VAULT)
            .priority(priorities::VAULT)
            .register(registry)?;
    }

    Registration::new(DotEnvProvider::new(&config.dotenv_path))
        .name(names::DOTENV)
        .priority(priorities::DOTENV)
        .register(registry)?;

    Registration::new(FileProvider::json(&config.json_path))
        .name(names::JSON_FILE)
        .priority(priorities::JSON_FILE)
        .register(registry)?;

    if config.command_usable(OP_PROGRAM) {
        Registration::new(OnePasswordProvider::new(
            config.onepassword.clone(),
            config.runner(),
        ))
        .name(names::ONEPASSWORD)
        .priority(priorities::ONEPASSWORD)
        .register(registry)?;
    }

    Registration::new(FileProvider::yaml(&config.yaml_path))
        .name(names::YAML_FILE)
        .priority(priorities::YAML_FILE)
        .register(registry)?;

    if config.command_usable(LASTPASS_PROGRAM) {
        Registration::new(LastPassProvider::new(config.runner()))
            .name(names::LASTPASS)
            .priority(priorities::LASTPASS)
            .register(registry)?;
    }

    Registration::new(KeyringProvider::new(config.keyring_service.clone()))
        .name(names::KEYRING)
        .priority(priorities::KEYRING)
        .register(registry)?;

    Ok(())
}

/// Create a registry populated with the built-in providers.
pub fn create_default_registry(
    config: &BuiltinConfig,
    policy: ConflictPolicy,
) -> Result<ProviderRegistry> {
    let registry = ProviderRegistry::with_policy(policy);
    register_builtin_providers(&registry, config)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_commands() -> BuiltinConfig {
        BuiltinConfig {
            require_installed_commands: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_registry_order() {
        let registry = create_default_registry(&all_commands(), ConflictPolicy::Replace).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                names::ENVIRONMENT,
                names::VAULT,
                names::DOTENV,
                names::JSON_FILE,
                names::ONEPASSWORD,
                names::YAML_FILE,
                names::LASTPASS,
                names::KEYRING,
            ]
        );
    }

    #[test]
    fn test_file_and_keyring_providers_always_present() {
        let registry =
            create_default_registry(&BuiltinConfig::default(), ConflictPolicy::Replace).unwrap();
        for name in [
            names::ENVIRONMENT,
            names::DOTENV,
            names::JSON_FILE,
            names::YAML_FILE,
            names::KEYRING,
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(!registry.get(names::ENVIRONMENT).unwrap().supports_write());
        assert!(registry.get(names::KEYRING).unwrap().supports_write());
    }

    #[test]
    fn test_registering_twice_under_strict_policy_fails() {
        let registry = ProviderRegistry::with_policy(ConflictPolicy::Reject);
        register_builtin_providers(&registry, &all_commands()).unwrap();
        assert!(register_builtin_providers(&registry, &all_commands()).is_err());
    }

    #[test]
    fn test_registering_twice_is_idempotent_by_default() {
        let registry = ProviderRegistry::new();
        register_builtin_providers(&registry, &all_commands()).unwrap();
        register_builtin_providers(&registry, &all_commands()).unwrap();
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: BuiltinConfig =
            serde_json::from_str(r#"{"keyring_service": "ci", "command_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.keyring_service, "ci");
        assert_eq!(config.command_timeout_secs, 5);
        assert_eq!(config.dotenv_path, PathBuf::from(".env"));
    }
}
