//! Key provider trait definition.

use async_trait::async_trait;
use serde_json::{Map, Value};

use skm_common::{Error, KeyName, Params, Result, SecretValue};

/// Introspection metadata reported by a provider.
pub type ProviderInfo = Map<String, Value>;

/// Capability contract for secret backends.
///
/// Only `get_key` is required. Write, validation and description are
/// optional capabilities with conservative defaults: read-only, accept
/// everything, describe only the write flag.
///
/// Implementations must be cheap to share (`Arc<dyn KeyProvider>`) and must
/// handle their own authentication and timeouts.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Look up a key.
    ///
    /// # Returns
    /// - `Ok(Some(value))` if this provider holds the key
    /// - `Ok(None)` if it does not (a normal, silent outcome)
    ///
    /// # Errors
    /// - Provider-internal faults only (I/O, subprocess, keyring failures).
    ///   The resolution engine logs these and moves on to the next provider.
    async fn get_key(&self, key: &KeyName, params: &Params) -> Result<Option<SecretValue>>;

    /// Whether `write_key` can currently succeed.
    ///
    /// May be dynamic, e.g. a file provider whose target is read-only.
    fn supports_write(&self) -> bool {
        false
    }

    /// Persist a key.
    ///
    /// # Postconditions
    /// - `Ok(())` means the write is confirmed
    ///
    /// # Errors
    /// - Any failure; the engine records it against this target only
    async fn write_key(&self, key: &KeyName, value: &SecretValue, params: &Params) -> Result<()> {
        let _ = (value, params);
        Err(Error::NotPermitted(format!(
            "provider is read-only, cannot write '{}'",
            key
        )))
    }

    /// Pre-write gate. Returning `false` skips this provider for the write
    /// without counting as a failure.
    fn validate_key(&self, key: &KeyName, value: &SecretValue, params: &Params) -> bool {
        let _ = (key, value, params);
        true
    }

    /// Describe the provider for status listings. Never used for resolution.
    fn provider_info(&self) -> Result<ProviderInfo> {
        let mut info = ProviderInfo::new();
        info.insert("supports_write".into(), Value::Bool(self.supports_write()));
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl KeyProvider for Fixed {
        async fn get_key(&self, key: &KeyName, _params: &Params) -> Result<Option<SecretValue>> {
            Ok((key.as_str() == "KNOWN").then(|| SecretValue::from("value")))
        }
    }

    #[tokio::test]
    async fn test_defaults_are_read_only() {
        let provider = Fixed;
        let key = KeyName::new("KNOWN").unwrap();
        let value = SecretValue::from("v");

        assert!(!provider.supports_write());
        assert!(provider.validate_key(&key, &value, &Params::new()));

        let err = provider
            .write_key(&key, &value, &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotPermitted(_)));
    }

    #[tokio::test]
    async fn test_default_info_reports_write_flag() {
        let info = Fixed.provider_info().unwrap();
        assert_eq!(info.get("supports_write"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn test_absent_key_is_none() {
        let provider = Fixed;
        let missing = KeyName::new("MISSING").unwrap();
        assert!(provider
            .get_key(&missing, &Params::new())
            .await
            .unwrap()
            .is_none());
    }
}
