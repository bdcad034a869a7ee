//! Process environment key provider.

use async_trait::async_trait;
use serde_json::Value;

use crate::provider::{KeyProvider, ProviderInfo};
use skm_common::{Error, KeyName, Params, Result, SecretValue};

/// Reads keys from process environment variables.
///
/// Read-only. Empty variables count as absent.
#[derive(Debug, Default)]
pub struct EnvKeyProvider;

impl EnvKeyProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl KeyProvider for EnvKeyProvider {
    async fn get_key(&self, key: &KeyName, _params: &Params) -> Result<Option<SecretValue>> {
        match std::env::var(key.as_str()) {
            Ok(value) if !value.is_empty() => Ok(Some(SecretValue::new(value))),
            Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(Error::Provider(format!(
                "environment variable {} contains invalid UTF-8",
                key
            ))),
        }
    }

    fn provider_info(&self) -> Result<ProviderInfo> {
        let mut info = ProviderInfo::new();
        info.insert("supports_write".into(), Value::Bool(false));
        info.insert("source".into(), Value::from("process environment"));
        Ok(info)
    }
}
