//! OS keyring key provider.
//!
//! Backed by the platform credential store: Keychain on macOS, Credential
//! Manager on Windows, the kernel keyutils store on Linux.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::provider::{KeyProvider, ProviderInfo};
use skm_common::{Error, KeyName, Params, Result, SecretValue};

/// Default keyring service name.
pub const DEFAULT_SERVICE: &str = "secret_key_manager";

/// Per-call parameter overriding the service name.
pub const SERVICE_PARAM: &str = "service_name";

/// Reads and writes keys as keyring entries `(service, key)`.
#[derive(Debug, Clone)]
pub struct KeyringProvider {
    service: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn service_for<'a>(&'a self, params: &'a Params) -> &'a str {
        params.get(SERVICE_PARAM).unwrap_or(self.service.as_str())
    }
}

impl Default for KeyringProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

fn keyring_error(e: keyring::Error) -> Error {
    Error::Keyring(e.to_string())
}

/// Keyring calls may block on IPC, so they run on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Keyring(format!("keyring task failed: {}", e)))?
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get_key(&self, key: &KeyName, params: &Params) -> Result<Option<SecretValue>> {
        let service = self.service_for(params).to_string();
        let account = key.as_str().to_string();

        blocking(move || {
            let entry = keyring::Entry::new(&service, &account).map_err(keyring_error)?;
            match entry.get_password() {
                Ok(password) => Ok(Some(SecretValue::new(password))),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(keyring_error(e)),
            }
        })
        .await
    }

    fn supports_write(&self) -> bool {
        true
    }

    async fn write_key(&self, key: &KeyName, value: &SecretValue, params: &Params) -> Result<()> {
        let service = self.service_for(params).to_string();
        let account = key.as_str().to_string();
        let value = value.clone();

        blocking(move || {
            let entry = keyring::Entry::new(&service, &account).map_err(keyring_error)?;
            entry.set_password(value.expose()).map_err(keyring_error)?;
            debug!(key = %account, service = %service, "Wrote key to keyring");
            Ok(())
        })
        .await
    }

    fn provider_info(&self) -> Result<ProviderInfo> {
        let mut info = ProviderInfo::new();
        info.insert("supports_write".into(), Value::Bool(true));
        info.insert("service_name".into(), Value::from(self.service.clone()));
        info.insert("backend".into(), Value::from(std::env::consts::OS));
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_override() {
        let provider = KeyringProvider::default();
        assert_eq!(provider.service(), DEFAULT_SERVICE);

        let params = Params::new().with(SERVICE_PARAM, "ci");
        assert_eq!(provider.service_for(&params), "ci");
        assert_eq!(provider.service_for(&Params::new()), DEFAULT_SERVICE);
    }

    #[test]
    fn test_info() {
        let info = KeyringProvider::new("svc").provider_info().unwrap();
        assert_eq!(info.get("service_name"), Some(&Value::from("svc")));
        assert_eq!(info.get("supports_write"), Some(&Value::Bool(true)));
    }
}
