//! `vault` CLI key provider.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::command::CommandRunner;
use crate::provider::{KeyProvider, ProviderInfo};
use skm_common::{KeyName, Params, Result, SecretValue};

/// Program invoked as `vault <KEY>`.
pub const VAULT_PROGRAM: &str = "vault";

/// Reads keys by running `vault <KEY>` and taking its trimmed stdout.
///
/// A non-zero exit or empty output means the key is absent.
#[derive(Debug, Clone, Default)]
pub struct VaultCliProvider {
    runner: CommandRunner,
    program: Option<String>,
}

impl VaultCliProvider {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner,
            program: None,
        }
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    fn program(&self) -> &str {
        self.program.as_deref().unwrap_or(VAULT_PROGRAM)
    }
}

#[async_trait]
impl KeyProvider for VaultCliProvider {
    async fn get_key(&self, key: &KeyName, _params: &Params) -> Result<Option<SecretValue>> {
        let output = self.runner.run(self.program(), [key.as_str()]).await?;
        if !output.success {
            debug!(key = %key, code = ?output.code, "vault did not return the key");
        }
        Ok(output.secret())
    }

    fn provider_info(&self) -> Result<ProviderInfo> {
        let mut info = ProviderInfo::new();
        info.insert("supports_write".into(), Value::Bool(false));
        info.insert("command".into(), Value::from(self.program()));
        Ok(info)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("fake-vault");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn test_returns_trimmed_stdout() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "[ \"$1\" = API_KEY ] && echo ' from-vault ' || exit 1");
        let provider = VaultCliProvider::default().with_program(program);

        let hit = provider
            .get_key(&KeyName::new("API_KEY").unwrap(), &Params::new())
            .await
            .unwrap();
        assert_eq!(hit.unwrap().expose(), "from-vault");

        let miss = provider
            .get_key(&KeyName::new("OTHER").unwrap(), &Params::new())
            .await
            .unwrap();
        assert!(miss.is_none());
    }
}
