//! Flat key-file providers (JSON and YAML).

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::paths::{default_key_file, expand_home, write_atomic};
use crate::provider::{KeyProvider, ProviderInfo};
use skm_common::{Error, KeyName, Params, Result, SecretValue};

/// Per-call parameter overriding the provider's file path.
pub const FILE_PATH_PARAM: &str = "file_path";

/// Serialization format of a key file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::Yaml => "yaml",
        }
    }

    /// Parse a top-level mapping. Empty documents are empty mappings.
    fn parse(&self, content: &str) -> Result<Map<String, Value>> {
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        let value: Value = match self {
            FileFormat::Json => serde_json::from_str(content)?,
            FileFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Error::Serialization(e.to_string()))?,
        };
        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(Error::Serialization(format!(
                "expected a mapping at the top level, found {}",
                type_name(&other)
            ))),
        }
    }

    fn render(&self, map: &Map<String, Value>) -> Result<String> {
        match self {
            FileFormat::Json => Ok(serde_json::to_string_pretty(map)?),
            FileFormat::Yaml => {
                serde_yaml::to_string(map).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Scalar entries are usable as secrets; nested structures and nulls are not.
fn scalar_to_secret(value: &Value) -> Option<SecretValue> {
    match value {
        Value::String(s) => Some(SecretValue::new(s.clone())),
        Value::Number(n) => Some(SecretValue::new(n.to_string())),
        Value::Bool(b) => Some(SecretValue::new(b.to_string())),
        _ => None,
    }
}

/// A missing file counts as writable; it is created on first write.
fn writable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => !meta.permissions().readonly(),
        Err(_) => true,
    }
}

/// Key provider backed by a flat JSON or YAML mapping of key → value.
///
/// The file is read on every call so concurrent edits by other processes are
/// picked up. Writes preserve all other entries and create missing parent
/// directories.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
    format: FileFormat,
}

impl FileProvider {
    /// Create a provider for `path` in the given format. `~` is expanded.
    pub fn new(path: impl AsRef<Path>, format: FileFormat) -> Self {
        Self {
            path: expand_home(path),
            format,
        }
    }

    /// JSON provider at `path`.
    pub fn json(path: impl AsRef<Path>) -> Self {
        Self::new(path, FileFormat::Json)
    }

    /// YAML provider at `path`.
    pub fn yaml(path: impl AsRef<Path>) -> Self {
        Self::new(path, FileFormat::Yaml)
    }

    /// Default JSON key file.
    pub fn default_json() -> Self {
        Self::json(default_key_file("keys.json"))
    }

    /// Default YAML key file.
    pub fn default_yaml() -> Self {
        Self::yaml(default_key_file("keys.yaml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    fn resolve_path(&self, params: &Params) -> PathBuf {
        params
            .get(FILE_PATH_PARAM)
            .map(expand_home)
            .unwrap_or_else(|| self.path.clone())
    }

    async fn load(&self, path: &Path) -> Result<Map<String, Value>> {
        match fs::read_to_string(path).await {
            Ok(content) => self.format.parse(&content).map_err(|e| {
                Error::Provider(format!("failed to parse {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), format = self.format.as_str(), "Key file not found");
                Ok(Map::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, path: &Path, map: &Map<String, Value>) -> Result<()> {
        let rendered = self.format.render(map)?;
        write_atomic(path, rendered.as_bytes()).await?;
        debug!(path = %path.display(), format = self.format.as_str(), "Saved key file");
        Ok(())
    }
}

#[async_trait]
impl KeyProvider for FileProvider {
    async fn get_key(&self, key: &KeyName, params: &Params) -> Result<Option<SecretValue>> {
        let path = self.resolve_path(params);
        let map = self.load(&path).await?;
        Ok(map.get(key.as_str()).and_then(scalar_to_secret))
    }

    /// Writable unless the target file exists and is marked read-only.
    fn supports_write(&self) -> bool {
        writable(&self.path)
    }

    async fn write_key(&self, key: &KeyName, value: &SecretValue, params: &Params) -> Result<()> {
        let path = self.resolve_path(params);
        if !writable(&path) {
            return Err(Error::NotPermitted(format!(
                "{} is read-only",
                path.display()
            )));
        }
        let mut map = self.load(&path).await?;
        map.insert(
            key.as_str().to_string(),
            Value::String(value.expose().to_string()),
        );
        self.save(&path, &map).await
    }

    fn provider_info(&self) -> Result<ProviderInfo> {
        let mut info = ProviderInfo::new();
        info.insert("supports_write".into(), Value::Bool(self.supports_write()));
        info.insert("format".into(), Value::from(self.format.as_str()));
        info.insert(
            "file_path".into(),
            Value::from(self.path.display().to_string()),
        );
        Ok(info)
    }
}
