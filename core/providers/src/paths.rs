//! Filesystem path helpers shared by file-backed providers.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use skm_common::{Error, Result};

/// Directory under the user's config dir holding default key files.
pub const APP_DIR: &str = "secret_key_manager";

/// Expand a leading `~` to the home directory.
///
/// Paths without a leading `~`, or hosts without a home directory, are
/// returned unchanged.
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Default location for a key file named `file_name`
/// (`~/.config/secret_key_manager/<file_name>` on Linux).
pub fn default_key_file(file_name: &str) -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| expand_home("~/.config"))
        .join(APP_DIR)
        .join(file_name)
}

/// Replace the contents of `path` without ever leaving it half written.
///
/// The data goes to a sibling temporary file which is synced and then
/// renamed over `path`. Missing parent directories are created.
///
/// # Errors
/// - `path` has no file name
/// - Any I/O failure; the original file is left untouched
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("{} is not a file path", path.display())))?;
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = match parent {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    };

    let written = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("keys.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_write_atomic_failure_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, "original").unwrap();

        // A directory where the temporary file would go makes the write fail.
        let blocker = dir
            .path()
            .join(format!(".keys.json.{}.tmp", std::process::id()));
        std::fs::create_dir(&blocker).unwrap();

        assert!(write_atomic(&path, b"replacement").await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home("~/keys.json");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("keys.json"));
        }
        assert_eq!(expand_home("/etc/keys.json"), PathBuf::from("/etc/keys.json"));
        assert_eq!(expand_home("relative/.env"), PathBuf::from("relative/.env"));
    }

    #[test]
    fn test_default_key_file() {
        let path = default_key_file("keys.json");
        assert!(path.ends_with("secret_key_manager/keys.json"));
    }
}
