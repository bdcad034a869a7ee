//! Key provider abstraction for the secret key manager.
//!
//! This module provides a trait-based capability contract for secret
//! backends (environment, dotenv/JSON/YAML files, OS keyring, password
//! manager CLIs), a process-wide provider registry, and a declarative
//! registration builder.
//!
//! # Design Principles
//! - Provider isolation: backends know nothing about ordering or fan-out
//! - Absence is not an error: `get_key` returns `Ok(None)` for unknown keys
//! - Optional capabilities (write, validate, describe) have trait defaults

pub mod provider;
pub mod registry;
pub mod registration;
pub mod builtin;

pub mod command;
pub mod dotenv;
pub mod env;
pub mod file;
pub mod os_keyring;
pub mod lastpass;
pub mod memory;
pub mod onepassword;
pub mod paths;
pub mod vault;

pub use provider::{KeyProvider, ProviderInfo};
pub use registry::{ConflictPolicy, ProviderEntry, ProviderRegistry, DEFAULT_PRIORITY};
pub use registration::{derive_provider_name, Registration};
pub use builtin::{create_default_registry, register_builtin_providers, BuiltinConfig};

pub use dotenv::DotEnvProvider;
pub use env::EnvKeyProvider;
pub use file::{FileFormat, FileProvider};
pub use os_keyring::KeyringProvider;
pub use lastpass::LastPassProvider;
pub use memory::MemoryProvider;
pub use onepassword::{OnePasswordProvider, OnePasswordSettings};
pub use vault::VaultCliProvider;
