//! Resolution engine for the secret key manager.
//!
//! This module provides:
//! - Ordered, fault-isolated key lookup across registered providers
//! - Write fan-out to writable providers with per-target reporting
//! - Runtime enable/disable and live status introspection
//! - The on-disk configuration file
//!
//! # Architecture
//! The manager sits between callers (library users, the CLI) and the
//! provider registry. Providers never see each other; ordering, failure
//! isolation and aggregation all happen here.

pub mod config;
pub mod manager;
pub mod options;
pub mod report;

pub use config::{ManagerConfig, ProviderOverride};
pub use manager::{KeyManager, ProviderStatus};
pub use options::LookupOptions;
pub use report::{
    AttemptOutcome, LookupReport, ProviderAttempt, SkipReason, SkippedProvider, TargetOutcome,
    WriteReport, WriteTarget,
};
