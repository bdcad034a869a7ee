//! Per-call options for lookups and writes.

use std::time::Duration;

use skm_common::Params;

/// Options accompanying a single `get`/`set` call.
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    /// Restrict to these providers, queried in exactly this order.
    /// `None` means every enabled provider in priority order.
    pub providers: Option<Vec<String>>,
    /// Parameters forwarded unmodified to every provider called.
    pub params: Params,
    /// Upper bound for each individual provider call.
    pub timeout: Option<Duration>,
}

impl LookupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict and order the candidate providers.
    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
