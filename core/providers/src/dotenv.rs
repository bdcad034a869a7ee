//! `.env` file key provider.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::file::FILE_PATH_PARAM;
use crate::paths::{expand_home, write_atomic};
use crate::provider::{KeyProvider, ProviderInfo};
use skm_common::{Error, KeyName, Params, Result, SecretValue};

/// Reads and writes `KEY=value` pairs in a dotenv file.
///
/// Values are written single-quoted (double-quoted with escapes when the
/// value itself contains a single quote). Existing assignments of the same
/// key are replaced in place; other lines, comments included, are kept.
#[derive(Debug, Clone)]
pub struct DotEnvProvider {
    path: PathBuf,
}

impl DotEnvProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: expand_home(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve_path(&self, params: &Params) -> PathBuf {
        params
            .get(FILE_PATH_PARAM)
            .map(expand_home)
            .unwrap_or_else(|| self.path.clone())
    }

    async fn read_file(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for DotEnvProvider {
    fn default() -> Self {
        Self::new(".env")
    }
}

/// Render a single assignment line.
///
/// Double-quoted values are subject to `$` substitution on read, so `$` is
/// escaped along with `\` and `"`.
fn format_assignment(key: &str, value: &str) -> String {
    if !value.contains('\'') {
        format!("{}='{}'", key, value)
    } else {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("{}=\"{}\"", key, escaped)
    }
}

/// Whether `line` assigns `key`, with or without a leading `export`.
fn assigns(line: &str, key: &str) -> bool {
    let trimmed = line.trim_start();
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim_start();
    trimmed
        .strip_prefix(key)
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}

fn upsert(content: &str, key: &str, value: &str) -> String {
    let line = format_assignment(key, value);
    let mut replaced = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|existing| {
            if !replaced && assigns(existing, key) {
                replaced = true;
                line.clone()
            } else {
                existing.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(line);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[async_trait]
impl KeyProvider for DotEnvProvider {
    async fn get_key(&self, key: &KeyName, params: &Params) -> Result<Option<SecretValue>> {
        let path = self.resolve_path(params);
        let Some(content) = Self::read_file(&path).await? else {
            debug!(path = %path.display(), ".env file not found");
            return Ok(None);
        };

        for item in dotenvy::from_read_iter(content.as_bytes()) {
            let (name, value) = item.map_err(|e| {
                Error::Provider(format!("failed to parse {}: {}", path.display(), e))
            })?;
            if name == key.as_str() {
                return Ok(Some(SecretValue::new(value)));
            }
        }
        Ok(None)
    }

    fn supports_write(&self) -> bool {
        true
    }

    async fn write_key(&self, key: &KeyName, value: &SecretValue, params: &Params) -> Result<()> {
        let path = self.resolve_path(params);
        let existing = Self::read_file(&path).await?.unwrap_or_default();
        let updated = upsert(&existing, key.as_str(), value.expose());
        write_atomic(&path, updated.as_bytes()).await?;

        debug!(key = %key, path = %path.display(), "Wrote key to .env file");
        Ok(())
    }

    /// Key names must be usable as shell variable names; values must fit on
    /// one line.
    fn validate_key(&self, key: &KeyName, value: &SecretValue, _params: &Params) -> bool {
        let name = key.as_str();
        if name.contains(|c: char| c == '=' || c.is_whitespace()) {
            warn!(key = name, "Key name is not a valid .env variable name");
            return false;
        }
        if value.expose().contains(['\n', '\r']) {
            warn!(key = name, "Multi-line values are not supported in .env files");
            return false;
        }
        true
    }

    fn provider_info(&self) -> Result<ProviderInfo> {
        let mut info = ProviderInfo::new();
        info.insert("supports_write".into(), Value::Bool(true));
        info.insert(
            "file_path".into(),
            Value::from(self.path.display().to_string()),
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(name: &str) -> KeyName {
        KeyName::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_reads_dotenv_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\nAPI_KEY=abc123\nQUOTED=\"with space\"\n").unwrap();

        let provider = DotEnvProvider::new(&path);
        let params = Params::new();

        let value = provider.get_key(&key("API_KEY"), &params).await.unwrap();
        assert_eq!(value.unwrap().expose(), "abc123");

        let quoted = provider.get_key(&key("QUOTED"), &params).await.unwrap();
        assert_eq!(quoted.unwrap().expose(), "with space");

        assert!(provider.get_key(&key("MISSING"), &params).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_replaces_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# keep me\nAPI_KEY=old\nOTHER=1\n").unwrap();

        let provider = DotEnvProvider::new(&path);
        let params = Params::new();

        provider
            .write_key(&key("API_KEY"), &SecretValue::from("new"), &params)
            .await
            .unwrap();
        provider
            .write_key(&key("ADDED"), &SecretValue::from("it's"), &params)
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# keep me\nAPI_KEY='new'\nOTHER=1\nADDED=\"it's\"\n"
        );

        let added = provider.get_key(&key("ADDED"), &params).await.unwrap();
        assert_eq!(added.unwrap().expose(), "it's");
    }

    #[tokio::test]
    async fn test_write_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join(".env");
        let provider = DotEnvProvider::new(&path);

        provider
            .write_key(&key("TOKEN"), &SecretValue::from("t"), &Params::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "TOKEN='t'\n");
    }

    #[tokio::test]
    async fn test_file_path_param_override() {
        let dir = TempDir::new().unwrap();
        let other = dir.path().join("other.env");
        std::fs::write(&other, "API_KEY=from-other\n").unwrap();

        let provider = DotEnvProvider::new(dir.path().join(".env"));
        let params = Params::new().with(FILE_PATH_PARAM, other.display().to_string());

        let value = provider.get_key(&key("API_KEY"), &params).await.unwrap();
        assert_eq!(value.unwrap().expose(), "from-other");
    }

    #[tokio::test]
    async fn test_quoted_value_with_dollar_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let provider = DotEnvProvider::new(&path);
        let params = Params::new();

        for (name, value) in [
            ("PW", "it's $HOME"),
            ("BRACED", "it's ${USER} and \\$x \"q\""),
            ("PLAIN", "$HOME stays literal"),
        ] {
            provider
                .write_key(&key(name), &SecretValue::from(value), &params)
                .await
                .unwrap();
        }

        for (name, value) in [
            ("PW", "it's $HOME"),
            ("BRACED", "it's ${USER} and \\$x \"q\""),
            ("PLAIN", "$HOME stays literal"),
        ] {
            let read = provider.get_key(&key(name), &params).await.unwrap();
            assert_eq!(read.unwrap().expose(), value);
        }
    }

    #[tokio::test]
    async fn test_write_leaves_no_temporary_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let provider = DotEnvProvider::new(&path);

        provider
            .write_key(&key("A"), &SecretValue::from("1"), &Params::new())
            .await
            .unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(".env")]);
    }

    #[test]
    fn test_validation() {
        let provider = DotEnvProvider::default();
        let params = Params::new();
        let value = SecretValue::from("v");

        assert!(provider.validate_key(&key("GOOD_NAME"), &value, &params));
        assert!(!provider.validate_key(&key("BAD NAME"), &value, &params));
        assert!(!provider.validate_key(&key("A=B"), &value, &params));
        assert!(!provider.validate_key(&key("GOOD"), &SecretValue::from("a\nb"), &params));
    }

    #[test]
    fn test_assigns_matches_export_prefix() {
        assert!(assigns("export API_KEY=1", "API_KEY"));
        assert!(assigns("API_KEY = 1", "API_KEY"));
        assert!(!assigns("API_KEY_2=1", "API_KEY"));
        assert!(!assigns("# API_KEY=1", "API_KEY"));
    }
}
