//! Key resolution engine.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::config::ManagerConfig;
use crate::options::LookupOptions;
use crate::report::{
    AttemptOutcome, LookupReport, ProviderAttempt, SkipReason, SkippedProvider, TargetOutcome,
    WriteReport, WriteTarget,
};
use skm_common::{Error, KeyName, Result, SecretValue};
use skm_providers::{create_default_registry, ProviderEntry, ProviderInfo, ProviderRegistry};

/// Live status of one registered provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub enabled: bool,
    pub priority: i64,
    pub supports_write: bool,
    pub capabilities: ProviderInfo,
}

/// Why a guarded provider call produced no result.
enum CallError {
    Fault(String),
    TimedOut,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Ask a provider whether it accepts writes. A panic counts as "no".
fn accepts_writes(entry: &ProviderEntry) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(|| entry.supports_write())) {
        Ok(writable) => writable,
        Err(payload) => {
            warn!(
                provider = entry.name(),
                error = panic_message(payload.as_ref()),
                "Provider panicked reporting write support"
            );
            false
        }
    }
}

/// Run one provider call, converting errors, panics and timeouts into a
/// [`CallError`] so they never escape the engine.
async fn guarded<T, F>(call: F, timeout: Option<Duration>) -> std::result::Result<T, CallError>
where
    F: Future<Output = Result<T>>,
{
    let caught = AssertUnwindSafe(call).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, caught).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(CallError::TimedOut),
        },
        None => caught.await,
    };
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CallError::Fault(e.to_string())),
        Err(payload) => Err(CallError::Fault(format!(
            "provider panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

/// Resolves keys against an ordered set of providers.
///
/// The manager holds no per-call state. Every operation snapshots the
/// registry, releases the lock and then talks to providers one at a time,
/// so enabling or disabling a provider affects subsequent calls only.
///
/// # Example
/// ```no_run
/// # async fn example() -> skm_common::Result<()> {
/// use skm_manager::{KeyManager, LookupOptions, ManagerConfig};
///
/// let manager = KeyManager::from_config(&ManagerConfig::default())?;
/// if let Some(token) = manager.get_key("API_TOKEN", &LookupOptions::default()).await? {
///     println!("{} bytes", token.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct KeyManager {
    registry: Arc<ProviderRegistry>,
    default_timeout: Option<Duration>,
}

impl KeyManager {
    /// Create a manager over an existing registry.
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            default_timeout: None,
        }
    }

    /// Bound each provider call when the request carries no timeout itself.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Build the built-in registry described by `config` and wrap it.
    ///
    /// # Errors
    /// - Duplicate registration under strict mode
    pub fn from_config(config: &ManagerConfig) -> Result<Self> {
        let registry = create_default_registry(&config.builtins, config.conflict_policy())?;
        config.apply_overrides(&registry);
        Ok(Self::new(Arc::new(registry)).with_default_timeout(config.timeout()))
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    fn timeout_for(&self, options: &LookupOptions) -> Option<Duration> {
        options.timeout.or(self.default_timeout)
    }

    /// Resolve the providers a call will visit.
    ///
    /// Explicit lists keep their order; duplicates collapse to the first
    /// occurrence. Unknown, disabled and (for writes) read-only names are
    /// reported rather than failing the call.
    fn select(
        &self,
        explicit: Option<&[String]>,
        for_write: bool,
    ) -> Result<(Vec<ProviderEntry>, Vec<SkippedProvider>)> {
        let Some(names) = explicit else {
            let entries = self
                .registry
                .enabled_entries()
                .into_iter()
                .filter(|entry| !for_write || accepts_writes(entry))
                .collect();
            return Ok((entries, Vec::new()));
        };

        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::InvalidInput(
                "provider names must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        for name in names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let reason = match self.registry.get(name) {
                None => Some(SkipReason::Unknown),
                Some(entry) if !entry.is_enabled() => Some(SkipReason::Disabled),
                Some(entry) if for_write && !accepts_writes(&entry) => Some(SkipReason::ReadOnly),
                Some(entry) => {
                    entries.push(entry);
                    None
                }
            };
            if let Some(reason) = reason {
                warn!(provider = %name, reason = %reason, "Skipping requested provider");
                skipped.push(SkippedProvider {
                    provider: name.clone(),
                    reason,
                });
            }
        }
        Ok((entries, skipped))
    }

    /// Resolve a key and describe every provider consulted.
    ///
    /// # Errors
    /// - Blank key name
    /// - Blank name in the explicit provider list
    pub async fn lookup(&self, key: &str, options: &LookupOptions) -> Result<LookupReport> {
        let key = KeyName::new(key)?;
        let (candidates, skipped) = self.select(options.providers.as_deref(), false)?;
        let timeout = self.timeout_for(options);

        let mut report = LookupReport {
            key,
            value: None,
            source: None,
            attempts: Vec::with_capacity(candidates.len()),
            skipped,
        };

        for entry in candidates {
            let started = Instant::now();
            let result = guarded(
                entry.instance().get_key(&report.key, &options.params),
                timeout,
            )
            .await;

            let outcome = match result {
                Ok(Some(value)) if value.is_empty() => {
                    debug!(key = %report.key, provider = entry.name(), "Provider returned an empty value");
                    AttemptOutcome::NotFound
                }
                Ok(Some(value)) => {
                    debug!(key = %report.key, provider = entry.name(), "Retrieved key from provider");
                    report.value = Some(value);
                    report.source = Some(entry.name().to_string());
                    AttemptOutcome::Found
                }
                Ok(None) => AttemptOutcome::NotFound,
                Err(CallError::Fault(msg)) => {
                    warn!(key = %report.key, provider = entry.name(), error = %msg, "Error in provider");
                    AttemptOutcome::Fault(msg)
                }
                Err(CallError::TimedOut) => {
                    warn!(key = %report.key, provider = entry.name(), "Provider timed out");
                    AttemptOutcome::TimedOut
                }
            };

            let found = outcome == AttemptOutcome::Found;
            report.attempts.push(ProviderAttempt {
                provider: entry.name().to_string(),
                outcome,
                elapsed: started.elapsed(),
            });
            if found {
                return Ok(report);
            }
        }

        if report.all_faulted() {
            warn!(key = %report.key, providers = ?report.tried(), "Every provider failed");
        } else {
            debug!(key = %report.key, "Key not found in any provider");
        }
        Ok(report)
    }

    /// Retrieve a key from the first provider that has it.
    ///
    /// # Returns
    /// `Ok(None)` when no provider holds the key, including when every
    /// provider failed; use [`KeyManager::lookup`] to tell those apart.
    ///
    /// # Errors
    /// - Blank key name or blank provider name
    pub async fn get_key(&self, key: &str, options: &LookupOptions) -> Result<Option<SecretValue>> {
        Ok(self.lookup(key, options).await?.into_value())
    }

    /// Write a key to every selected writable provider and report each one.
    ///
    /// With `persist == false` no provider is touched and the report is
    /// successful.
    ///
    /// # Errors
    /// - Blank key name or blank provider name
    pub async fn write(
        &self,
        key: &str,
        value: &SecretValue,
        persist: bool,
        options: &LookupOptions,
    ) -> Result<WriteReport> {
        let key = KeyName::new(key)?;
        let mut report = WriteReport {
            key: key.as_str().to_string(),
            persist,
            targets: Vec::new(),
            skipped: Vec::new(),
        };
        if !persist {
            debug!(key = %key, "Key accepted without persistence");
            return Ok(report);
        }

        let (targets, skipped) = self.select(options.providers.as_deref(), true)?;
        report.skipped = skipped;
        let timeout = self.timeout_for(options);

        for entry in targets {
            let provider = entry.instance();
            let valid = std::panic::catch_unwind(AssertUnwindSafe(|| {
                provider.validate_key(&key, value, &options.params)
            }));

            let outcome = match valid {
                Ok(false) => {
                    warn!(key = %key, provider = entry.name(), "Key validation failed");
                    TargetOutcome::Rejected
                }
                Err(payload) => {
                    let msg = format!(
                        "validation panicked: {}",
                        panic_message(payload.as_ref())
                    );
                    warn!(key = %key, provider = entry.name(), error = %msg, "Error in provider");
                    TargetOutcome::Failed(msg)
                }
                Ok(true) => {
                    match guarded(provider.write_key(&key, value, &options.params), timeout).await
                    {
                        Ok(()) => {
                            debug!(key = %key, provider = entry.name(), "Stored key in provider");
                            TargetOutcome::Written
                        }
                        Err(CallError::Fault(msg)) => {
                            warn!(key = %key, provider = entry.name(), error = %msg, "Failed to store key");
                            TargetOutcome::Failed(msg)
                        }
                        Err(CallError::TimedOut) => {
                            warn!(key = %key, provider = entry.name(), "Provider timed out");
                            TargetOutcome::Failed("timed out".to_string())
                        }
                    }
                }
            };

            report.targets.push(WriteTarget {
                provider: entry.name().to_string(),
                outcome,
            });
        }

        if report.targets.is_empty() {
            warn!(key = %key, "No writable provider selected");
        }
        Ok(report)
    }

    /// Set a key, returning whether it was stored by at least one provider.
    ///
    /// # Returns
    /// - `true` without touching any provider when `persist` is false
    /// - otherwise `true` iff some target wrote successfully; an empty
    ///   target set yields `false`
    pub async fn set_key(
        &self,
        key: &str,
        value: &SecretValue,
        persist: bool,
        options: &LookupOptions,
    ) -> Result<bool> {
        Ok(self.write(key, value, persist, options).await?.succeeded())
    }

    /// Check that a key is resolvable, logging an error naming the providers
    /// tried when it is not.
    pub async fn ensure_key(&self, key: &str, options: &LookupOptions) -> Result<bool> {
        let report = self.lookup(key, options).await?;
        if report.found() {
            return Ok(true);
        }
        let tried = report.tried();
        let tried = if tried.is_empty() {
            "none".to_string()
        } else {
            tried.join(", ")
        };
        error!(key = %report.key, tried = %tried, "Required key not found in any provider");
        Ok(false)
    }

    /// Returns `false` if no provider has that name.
    pub fn enable_provider(&self, name: &str) -> bool {
        self.registry.set_enabled(name, true)
    }

    /// Returns `false` if no provider has that name.
    pub fn disable_provider(&self, name: &str) -> bool {
        self.registry.set_enabled(name, false)
    }

    /// Enabled provider names in resolution order.
    pub fn get_providers(&self) -> Vec<String> {
        self.registry
            .enabled_entries()
            .into_iter()
            .map(|entry| entry.name().to_string())
            .collect()
    }

    /// Enabled providers currently accepting writes.
    pub fn get_writable_providers(&self) -> BTreeSet<String> {
        self.registry
            .enabled_entries()
            .into_iter()
            .filter(accepts_writes)
            .map(|entry| entry.name().to_string())
            .collect()
    }

    /// Status of every registered provider, enabled or not.
    pub fn get_provider_status(&self) -> BTreeMap<String, ProviderStatus> {
        self.registry
            .entries()
            .into_iter()
            .map(|entry| {
                let info = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    entry.instance().provider_info()
                }));
                let capabilities = match info {
                    Ok(Ok(info)) => info,
                    Ok(Err(e)) => {
                        warn!(provider = entry.name(), error = %e, "Failed to describe provider");
                        ProviderInfo::new()
                    }
                    Err(payload) => {
                        warn!(
                            provider = entry.name(),
                            error = panic_message(payload.as_ref()),
                            "Provider panicked while describing itself"
                        );
                        ProviderInfo::new()
                    }
                };
                let status = ProviderStatus {
                    enabled: entry.is_enabled(),
                    priority: entry.priority(),
                    supports_write: accepts_writes(&entry),
                    capabilities,
                };
                (entry.name().to_string(), status)
            })
            .collect()
    }
}
