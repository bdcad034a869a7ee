//! In-memory key provider for embedding and testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::provider::{KeyProvider, ProviderInfo};
use skm_common::{Error, KeyName, Params, Result, SecretValue};

/// In-memory key provider.
///
/// Useful for tests and for programs that want to seed values at startup.
/// All data is lost on drop.
pub struct MemoryProvider {
    entries: RwLock<HashMap<String, SecretValue>>,
    writable: bool,
}

impl MemoryProvider {
    /// Create a new empty, writable memory provider.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            writable: true,
        }
    }

    /// Create a writable provider seeded with entries.
    pub fn with_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), SecretValue::new(v)))
            .collect();
        Self {
            entries: RwLock::new(entries),
            writable: true,
        }
    }

    /// Make this provider refuse writes.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyProvider for MemoryProvider {
    async fn get_key(&self, key: &KeyName, _params: &Params) -> Result<Option<SecretValue>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key.as_str()).cloned())
    }

    fn supports_write(&self) -> bool {
        self.writable
    }

    async fn write_key(&self, key: &KeyName, value: &SecretValue, _params: &Params) -> Result<()> {
        if !self.writable {
            return Err(Error::NotPermitted(
                "memory provider is read-only".to_string(),
            ));
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.as_str().to_string(), value.clone());
        Ok(())
    }

    fn provider_info(&self) -> Result<ProviderInfo> {
        let mut info = ProviderInfo::new();
        info.insert("supports_write".into(), Value::Bool(self.writable));
        info.insert("keys".into(), Value::from(self.len()));
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> KeyName {
        KeyName::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let provider = MemoryProvider::new();
        let params = Params::new();

        assert!(provider.get_key(&key("A"), &params).await.unwrap().is_none());

        provider
            .write_key(&key("A"), &SecretValue::from("1"), &params)
            .await
            .unwrap();

        let value = provider.get_key(&key("A"), &params).await.unwrap().unwrap();
        assert_eq!(value.expose(), "1");
        assert_eq!(provider.len(), 1);
    }

    #[tokio::test]
    async fn test_seeded_entries() {
        let provider = MemoryProvider::with_entries([("A", "1"), ("B", "2")]);
        let value = provider
            .get_key(&key("B"), &Params::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.expose(), "2");
    }

    #[tokio::test]
    async fn test_read_only_refuses_writes() {
        let provider = MemoryProvider::new().read_only();
        assert!(!provider.supports_write());

        let result = provider
            .write_key(&key("A"), &SecretValue::from("1"), &Params::new())
            .await;
        assert!(matches!(result, Err(Error::NotPermitted(_))));
        assert!(provider.is_empty());
    }

    #[test]
    fn test_info_counts_keys() {
        let provider = MemoryProvider::with_entries([("A", "1")]);
        let info = provider.provider_info().unwrap();
        assert_eq!(info.get("keys"), Some(&Value::from(1)));
    }
}
