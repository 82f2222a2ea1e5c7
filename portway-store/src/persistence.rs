//! File persistence helpers.
//!
//! Handles loading and saving JSON documents to disk with owner-only
//! permissions. The async helpers serve configuration files; the blocking
//! [`write_atomic`] serves the durable cookie file, which is written from
//! synchronous cookie-jar callbacks.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;

// ============================================================================
// Default Paths
// ============================================================================

/// Returns the default configuration directory.
///
/// - macOS: `~/Library/Application Support/Portway`
/// - Linux: `~/.config/portway`
/// - Windows: `%APPDATA%\portway`
pub fn default_config_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support").join("Portway"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::config_dir()
            .map(|c| c.join("portway"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Returns the default data directory, home of the persisted cookies.
///
/// - macOS: `~/Library/Application Support/Portway/data`
/// - Linux: `~/.local/share/portway`
/// - Windows: `%APPDATA%\portway\data`
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        default_config_dir().join("data")
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::data_dir()
            .map(|d| d.join("portway"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Returns the default network settings file path.
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("network.json")
}

/// Returns the default durable cookie file path.
pub fn default_cookie_path() -> PathBuf {
    default_data_dir().join("cookies.json")
}

/// Returns the default SQLite cookie database path.
pub fn default_cookie_db_path() -> PathBuf {
    default_data_dir().join("cookies.db")
}

// ============================================================================
// Security: File Permissions
// ============================================================================

/// Sets restrictive file permissions (0o600) on Unix systems.
///
/// Cookie files hold session credentials, so only the owner may read them.
#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o600); // Owner read/write only
    std::fs::set_permissions(path, perms)?;

    debug!(path = %path.display(), mode = "0600", "Set restrictive permissions");
    Ok(())
}

/// Sets restrictive directory permissions (0o700) on Unix systems.
#[cfg(unix)]
fn set_restrictive_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o700); // Owner read/write/execute only
    std::fs::set_permissions(path, perms)?;

    debug!(path = %path.display(), mode = "0700", "Set restrictive directory permissions");
    Ok(())
}

/// No-op for non-Unix systems.
#[cfg(not(unix))]
fn set_restrictive_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

/// No-op for non-Unix systems.
#[cfg(not(unix))]
fn set_restrictive_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ============================================================================
// File Operations
// ============================================================================

/// Creates the parent directory of `path` with owner-only permissions.
fn create_secure_parent_dir(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!(path = %parent.display(), "Creating secure directory");
            std::fs::create_dir_all(parent)?;
            set_restrictive_dir_permissions(parent)?;
        }
    }
    Ok(())
}

/// Writes `contents` to `path` atomically (temp file + rename) with
/// restrictive permissions. Blocking.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    create_secure_parent_dir(path)?;

    let mut temp_name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, contents)?;
    set_restrictive_permissions(&temp_path)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Saves data to a JSON file with secure permissions.
///
/// Creates parent directories if they don't exist, writes atomically
/// (via temp file + rename), and sets restrictive permissions on Unix.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    debug!(path = %path.display(), "Saving JSON file");

    let json = serde_json::to_string_pretty(data)?;
    let path_buf = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path_buf, &json))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

    debug!(path = %path.display(), "JSON file saved securely");
    Ok(())
}

/// Loads data from a JSON file.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    debug!(path = %path.display(), "Loading JSON file");

    let content = tokio::fs::read_to_string(path).await?;
    let data = serde_json::from_str(&content)?;

    debug!(path = %path.display(), "JSON file loaded");
    Ok(data)
}

/// Loads data from a JSON file, returning default if not found.
pub async fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match load_json(path).await {
        Ok(data) => data,
        Err(e) => {
            if !matches!(e, StoreError::Io(_)) {
                warn!(path = %path.display(), error = %e, "Failed to load, using defaults");
            }
            T::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        assert!(!default_config_dir().as_os_str().is_empty());
        assert!(default_settings_path().ends_with("network.json"));
        assert!(default_cookie_path().ends_with("cookies.json"));
        assert!(default_cookie_db_path().ends_with("cookies.db"));
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cookies.json");

        write_atomic(&path, "{}").unwrap();
        write_atomic(&path, r#"{"a":"b"}"#).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"a":"b"}"#);
        assert!(!temp_dir.path().join("cookies.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("nested").join("test.json");

        write_atomic(&test_file, "{}").unwrap();

        let mode = std::fs::metadata(&test_file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "File should have 0600 permissions");
        let dir_mode = std::fs::metadata(test_file.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}
