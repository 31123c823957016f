//! Durable record of the installed version.
//!
//! The record lives in a small JSON document inside the install root, so it
//! shares the lifetime of the installation. It is only ever replaced whole
//! (temp file + rename) and is trusted only when the files it names exist.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::InstallError;

use super::release::ReleaseVersion;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    installed_version: Option<String>,
}

/// Reads and writes the installed-version record.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    /// Opens the store backed by `path`. The file need not exist.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the recorded version, if any.
    ///
    /// A missing, unreadable or corrupt record reads as absent.
    pub async fn get(&self) -> Option<ReleaseVersion> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read version record");
                return None;
            }
        };

        match serde_json::from_str::<StateFile>(&content) {
            Ok(state) => state.installed_version.map(ReleaseVersion::new),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt version record");
                None
            }
        }
    }

    /// Records `version` as installed.
    ///
    /// ## Errors
    /// Returns [`InstallError::StateWriteFailed`] if the record cannot be
    /// written; the previous record is left in place.
    pub async fn set(&self, version: &ReleaseVersion) -> Result<(), InstallError> {
        let failed = |reason: String| InstallError::StateWriteFailed {
            path: self.path.clone(),
            reason,
        };

        let state = StateFile {
            installed_version: Some(version.to_string()),
        };
        let json = serde_json::to_string_pretty(&state).map_err(|e| failed(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(e.to_string()))?;
        }

        // Write atomically (temp file + rename)
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            tokio::fs::remove_file(&temp_path).await.ok();
            return Err(failed(e.to_string()));
        }

        debug!(path = %self.path.display(), %version, "recorded installed version");
        Ok(())
    }

    /// Whether `version` is recorded and its binary is actually present.
    pub async fn is_satisfied(&self, version: &ReleaseVersion, binary_path: &Path) -> bool {
        if self.get().await.as_ref() != Some(version) {
            return false;
        }
        if is_installed_binary(binary_path).await {
            return true;
        }
        warn!(
            %version,
            path = %binary_path.display(),
            "version record names a missing binary; reinstalling"
        );
        false
    }
}

/// Whether `path` is a regular file that can be executed.
pub(crate) async fn is_installed_binary(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => is_executable(&meta),
        _ => false,
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_record_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::open(dir.path().join("state.json"));
        assert_eq!(store.get().await, None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::open(dir.path().join("nested/state.json"));
        store.set(&ReleaseVersion::new("v2.0.0")).await.unwrap();
        assert_eq!(store.get().await, Some(ReleaseVersion::new("2.0.0")));
        assert!(!dir.path().join("nested/state.tmp").exists());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"installedVersion\": \"2.0.0\""));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(VersionStore::open(path).get().await, None);
    }

    #[tokio::test]
    async fn test_record_without_binary_is_not_satisfied() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::open(dir.path().join("state.json"));
        let version = ReleaseVersion::new("1.0.0");
        store.set(&version).await.unwrap();

        let binary = dir.path().join("tool-1.0.0/tool");
        assert!(!store.is_satisfied(&version, &binary).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_executable_binary_is_not_satisfied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = VersionStore::open(dir.path().join("state.json"));
        let version = ReleaseVersion::new("1.0.0");
        store.set(&version).await.unwrap();

        let binary = dir.path().join("tool");
        std::fs::write(&binary, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!store.is_satisfied(&version, &binary).await);

        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(store.is_satisfied(&version, &binary).await);
        assert!(!store.is_satisfied(&ReleaseVersion::new("1.0.1"), &binary).await);
    }
}
