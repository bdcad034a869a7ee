//! Declarative provider registration.
//!
//! ```rust,ignore
//! use skm_providers::{EnvKeyProvider, ProviderRegistry, Registration};
//!
//! let registry = ProviderRegistry::new();
//! Registration::<EnvKeyProvider>::of()
//!     .priority(10)
//!     .name("environment")
//!     .register(&registry)?;
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::provider::KeyProvider;
use crate::registry::{ProviderRegistry, DEFAULT_PRIORITY};
use skm_common::Result;

type Factory<P> = Box<dyn FnOnce() -> Result<P>>;

/// Builder that constructs a provider and inserts it into a registry.
///
/// Defaults: priority [`DEFAULT_PRIORITY`], enabled, name derived from the
/// provider type (see [`derive_provider_name`]).
pub struct Registration<P> {
    factory: Factory<P>,
    name: Option<String>,
    priority: i64,
    enabled: bool,
}

impl<P: KeyProvider + 'static> Registration<P> {
    /// Register an already constructed provider.
    pub fn new(provider: P) -> Self {
        Self::from_factory(move || Ok(provider))
    }

    /// Register a provider built with its no-argument constructor.
    pub fn of() -> Self
    where
        P: Default,
    {
        Self::from_factory(|| Ok(P::default()))
    }

    /// Register a provider built by a factory, for providers that need
    /// constructor arguments. Factory errors abort the registration.
    pub fn from_factory<F>(factory: F) -> Self
    where
        F: FnOnce() -> Result<P> + 'static,
    {
        Self {
            factory: Box::new(factory),
            name: None,
            priority: DEFAULT_PRIORITY,
            enabled: true,
        }
    }

    /// Set the priority (lower is tried first).
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set an explicit provider name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set whether the provider starts enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The name this registration will use.
    pub fn provider_name(&self) -> String {
        self.name.clone().unwrap_or_else(derive_provider_name::<P>)
    }

    /// Build the provider and insert it into `registry`.
    ///
    /// # Postconditions
    /// - The registry holds exactly one entry under the provider name
    /// - Returns a handle to the registered instance
    ///
    /// # Errors
    /// - Factory failure
    /// - Registry rejection (blank name, strict conflict policy)
    pub fn register(self, registry: &ProviderRegistry) -> Result<Arc<P>> {
        let name = self.provider_name();
        let instance = Arc::new((self.factory)()?);

        registry.register(
            name.clone(),
            self.priority,
            self.enabled,
            instance.clone() as Arc<dyn KeyProvider>,
        )?;

        debug!(
            provider = %name,
            implementation = std::any::type_name::<P>(),
            priority = self.priority,
            enabled = self.enabled,
            "Provider registration complete"
        );
        Ok(instance)
    }
}

/// Derive a provider name from its type: the last path segment with a
/// trailing `KeyProvider` (or else `Provider`) removed, lower-cased.
///
/// `my_crate::CustomKeyProvider` becomes `custom`; a type consisting only
/// of the suffix keeps its full name.
pub fn derive_provider_name<P: ?Sized>() -> String {
    let full = std::any::type_name::<P>();
    let without_generics = full.split('<').next().unwrap_or(full);
    let base = without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics);

    let stripped = ["KeyProvider", "Provider"]
        .iter()
        .find_map(|suffix| base.strip_suffix(*suffix).filter(|s| !s.is_empty()))
        .unwrap_or(base);

    stripped.to_lowercase()
}
