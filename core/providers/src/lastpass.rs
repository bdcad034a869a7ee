//! LastPass CLI key provider.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::command::CommandRunner;
use crate::provider::{KeyProvider, ProviderInfo};
use skm_common::{KeyName, Params, Result, SecretValue};

/// LastPass lookup helper invoked as `olp <KEY>`.
pub const LASTPASS_PROGRAM: &str = "olp";

/// Reads keys through the LastPass helper CLI.
#[derive(Debug, Clone, Default)]
pub struct LastPassProvider {
    runner: CommandRunner,
}

impl LastPassProvider {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    pub fn is_available() -> bool {
        CommandRunner::is_installed(LASTPASS_PROGRAM)
    }
}

#[async_trait]
impl KeyProvider for LastPassProvider {
    async fn get_key(&self, key: &KeyName, _params: &Params) -> Result<Option<SecretValue>> {
        let output = self.runner.run(LASTPASS_PROGRAM, [key.as_str()]).await?;
        if !output.success {
            debug!(key = %key, stderr = %output.stderr.trim(), "LastPass lookup failed");
        }
        Ok(output.secret())
    }

    fn provider_info(&self) -> Result<ProviderInfo> {
        let mut info = ProviderInfo::new();
        info.insert("supports_write".into(), Value::Bool(false));
        info.insert("command".into(), Value::from(LASTPASS_PROGRAM));
        Ok(info)
    }
}
