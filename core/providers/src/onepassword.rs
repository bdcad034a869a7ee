//! 1Password CLI key provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::command::CommandRunner;
use crate::paths::expand_home;
use crate::provider::{KeyProvider, ProviderInfo};
use skm_common::{Error, KeyName, Params, Result, SecretValue};

/// The 1Password CLI executable.
pub const OP_PROGRAM: &str = "op";

/// Per-call parameter overriding the account.
pub const ACCOUNT_PARAM: &str = "account";
/// Per-call parameter overriding the env file with `op://` references.
pub const ENV_FILE_PARAM: &str = "env_file";

/// Account and reference file used by [`OnePasswordProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnePasswordSettings {
    /// Account shorthand or sign-in address passed to `op signin --account`.
    pub account: String,
    /// Env file whose values are `op://` secret references.
    pub env_file: String,
}

impl Default for OnePasswordSettings {
    fn default() -> Self {
        Self {
            account: "my.1password.com".to_string(),
            env_file: "~/.local/.env".to_string(),
        }
    }
}

/// Resolves keys through `op run`, which injects the secrets referenced by
/// an env file into a child process; the provider reads the key back with
/// `printenv`.
#[derive(Debug, Clone, Default)]
pub struct OnePasswordProvider {
    settings: OnePasswordSettings,
    runner: CommandRunner,
}

impl OnePasswordProvider {
    pub fn new(settings: OnePasswordSettings, runner: CommandRunner) -> Self {
        Self { settings, runner }
    }

    pub fn settings(&self) -> &OnePasswordSettings {
        &self.settings
    }

    pub fn is_available() -> bool {
        CommandRunner::is_installed(OP_PROGRAM)
    }
}

#[async_trait]
impl KeyProvider for OnePasswordProvider {
    async fn get_key(&self, key: &KeyName, params: &Params) -> Result<Option<SecretValue>> {
        let account = params
            .get(ACCOUNT_PARAM)
            .unwrap_or(self.settings.account.as_str())
            .to_string();
        let env_file = expand_home(
            params
                .get(ENV_FILE_PARAM)
                .unwrap_or(self.settings.env_file.as_str()),
        );

        let signin = self
            .runner
            .run(OP_PROGRAM, ["signin", "--account", account.as_str()])
            .await?;
        if !signin.success {
            return Err(Error::Command(format!(
                "op signin for account '{}' failed: {}",
                account,
                signin.stderr.trim()
            )));
        }

        let env_file_arg = format!("--env-file={}", env_file.display());
        let output = self
            .runner
            .run(
                OP_PROGRAM,
                [
                    "run",
                    env_file_arg.as_str(),
                    "--no-masking",
                    "--",
                    "printenv",
                    key.as_str(),
                ],
            )
            .await?;
        if !output.success {
            debug!(key = %key, account = %account, "1Password did not resolve the key");
        }
        Ok(output.secret())
    }

    fn provider_info(&self) -> Result<ProviderInfo> {
        let mut info = ProviderInfo::new();
        info.insert("supports_write".into(), Value::Bool(false));
        info.insert("account".into(), Value::from(self.settings.account.clone()));
        info.insert("env_file".into(), Value::from(self.settings.env_file.clone()));
        Ok(info)
    }
}
