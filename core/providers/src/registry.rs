//! Provider registry holding live provider instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::provider::KeyProvider;
use skm_common::{Error, Result};

/// Priority assigned when a registration does not specify one.
pub const DEFAULT_PRIORITY: i64 = 100;

/// What to do when a provider is registered under a name already in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Replace the existing entry (last registration wins).
    #[default]
    Replace,
    /// Keep the existing entry and fail the new registration.
    Reject,
}

/// A registered provider with its resolution metadata.
#[derive(Clone)]
pub struct ProviderEntry {
    name: String,
    priority: i64,
    enabled: bool,
    sequence: u64,
    instance: Arc<dyn KeyProvider>,
}

impl ProviderEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower values are tried first.
    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Registration order, used to break priority ties.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn instance(&self) -> &Arc<dyn KeyProvider> {
        &self.instance
    }

    /// Derived from the instance on every call, never cached.
    pub fn supports_write(&self) -> bool {
        self.instance.supports_write()
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, ProviderEntry>,
    next_sequence: u64,
}

/// Registry of key providers, keyed by unique name.
///
/// All mutations happen under a single write lock, so readers never observe
/// a half-applied registration. Readers receive owned snapshots and can
/// call providers without holding the lock.
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
    policy: ConflictPolicy,
}

impl ProviderRegistry {
    /// Create a new empty registry with last-write-wins semantics.
    pub fn new() -> Self {
        Self::with_policy(ConflictPolicy::Replace)
    }

    /// Create a new empty registry with the given conflict policy.
    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            policy,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a provider instance.
    ///
    /// # Preconditions
    /// - `name` must not be blank
    ///
    /// # Postconditions
    /// - Exactly one entry exists for `name`, carrying this configuration
    /// - The entry is ordered after every earlier registration of equal priority
    ///
    /// # Returns
    /// The entry that was replaced, if any.
    ///
    /// # Errors
    /// - Blank name
    /// - Name already registered under `ConflictPolicy::Reject`
    pub fn register(
        &self,
        name: impl Into<String>,
        priority: i64,
        enabled: bool,
        instance: Arc<dyn KeyProvider>,
    ) -> Result<Option<ProviderEntry>> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Provider name cannot be empty".to_string(),
            ));
        }

        let mut state = self.write();
        if self.policy == ConflictPolicy::Reject && state.entries.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Provider '{}' is already registered",
                name
            )));
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let entry = ProviderEntry {
            name: name.clone(),
            priority,
            enabled,
            sequence,
            instance,
        };
        let replaced = state.entries.insert(name.clone(), entry);

        if replaced.is_some() {
            debug!(provider = %name, priority, enabled, "Replaced existing provider registration");
        } else {
            debug!(provider = %name, priority, enabled, "Registered key provider");
        }

        Ok(replaced)
    }

    /// Set the enabled flag. Returns `false` if no such provider exists.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.write().entries.get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                debug!(provider = name, enabled, "Changed provider state");
                true
            }
            None => false,
        }
    }

    /// Change the priority of a registered provider. Returns `false` if no
    /// such provider exists.
    pub fn set_priority(&self, name: &str, priority: i64) -> bool {
        match self.write().entries.get_mut(name) {
            Some(entry) => {
                entry.priority = priority;
                true
            }
            None => false,
        }
    }

    /// Snapshot of a single entry.
    pub fn get(&self, name: &str) -> Option<ProviderEntry> {
        self.read().entries.get(name).cloned()
    }

    /// Check if a provider is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.read().entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// All entries, enabled or not, in resolution order
    /// (priority ascending, then registration order).
    pub fn entries(&self) -> Vec<ProviderEntry> {
        let mut entries: Vec<ProviderEntry> = self.read().entries.values().cloned().collect();
        entries.sort_by_key(|e| (e.priority, e.sequence));
        entries
    }

    /// Enabled entries in resolution order.
    pub fn enabled_entries(&self) -> Vec<ProviderEntry> {
        self.entries().into_iter().filter(|e| e.enabled).collect()
    }

    /// Names of all registered providers in resolution order.
    pub fn names(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.name).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("policy", &self.policy)
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;

    fn memory() -> Arc<dyn KeyProvider> {
        Arc::new(MemoryProvider::new())
    }

    #[test]
    fn test_register_and_get() {
        let registry = ProviderRegistry::new();
        let replaced = registry.register("test", 10, true, memory()).unwrap();
        assert!(replaced.is_none());

        let entry = registry.get("test").unwrap();
        assert_eq!(entry.name(), "test");
        assert_eq!(entry.priority(), 10);
        assert!(entry.is_enabled());
        assert!(entry.supports_write());
    }

    #[test]
    fn test_duplicate_registration_replaces() {
        let registry = ProviderRegistry::new();
        registry.register("test", 10, true, memory()).unwrap();

        let replaced = registry.register("test", 60, false, memory()).unwrap();
        assert_eq!(replaced.unwrap().priority(), 10);

        assert_eq!(registry.len(), 1);
        let entry = registry.get("test").unwrap();
        assert_eq!(entry.priority(), 60);
        assert!(!entry.is_enabled());
    }

    #[test]
    fn test_duplicate_registration_rejected_in_strict_mode() {
        let registry = ProviderRegistry::with_policy(ConflictPolicy::Reject);
        registry.register("test", 10, true, memory()).unwrap();

        let result = registry.register("test", 60, true, memory());
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert_eq!(registry.get("test").unwrap().priority(), 10);
    }

    #[test]
    fn test_blank_name_rejected() {
        let registry = ProviderRegistry::new();
        assert!(registry.register("  ", 10, true, memory()).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_entries_sorted_by_priority_then_registration() {
        let registry = ProviderRegistry::new();
        registry.register("late", 30, true, memory()).unwrap();
        registry.register("first", 10, true, memory()).unwrap();
        registry.register("tie_a", 20, true, memory()).unwrap();
        registry.register("tie_b", 20, true, memory()).unwrap();

        assert_eq!(registry.names(), vec!["first", "tie_a", "tie_b", "late"]);
    }

    #[test]
    fn test_set_enabled_and_unknown() {
        let registry = ProviderRegistry::new();
        registry.register("a", 10, true, memory()).unwrap();
        registry.register("b", 20, true, memory()).unwrap();

        assert!(registry.set_enabled("a", false));
        let enabled: Vec<String> = registry
            .enabled_entries()
            .into_iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(enabled, vec!["b"]);
        assert_eq!(registry.len(), 2);

        assert!(!registry.set_enabled("missing", true));
    }

    #[test]
    fn test_set_priority_reorders() {
        let registry = ProviderRegistry::new();
        registry.register("a", 10, true, memory()).unwrap();
        registry.register("b", 20, true, memory()).unwrap();

        assert!(registry.set_priority("b", 5));
        assert_eq!(registry.names(), vec!["b", "a"]);
        assert!(!registry.set_priority("missing", 1));
    }
}
