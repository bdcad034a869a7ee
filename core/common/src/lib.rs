//! Common utilities and types shared across the secret key manager crates.
//!
//! This module provides foundational types used by the provider registry,
//! the resolution engine and the CLI, ensuring consistent error semantics
//! and safe handling of secret material.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{KeyName, Params, SecretValue};
