//! Removal of superseded version directories.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Outcome of a sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Directories that were removed.
    pub removed: Vec<PathBuf>,
    /// Directories that could not be removed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Deletes every directory under `root` except `keep`.
///
/// Regular files (such as the version record) are left alone. Failures are
/// logged and reported but never abort the sweep, and a missing `root` is
/// treated as nothing to sweep.
pub async fn sweep_except(root: &Path, keep: &str) -> SweepReport {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(root = %root.display(), "install root missing, nothing to sweep");
            return report;
        }
        Err(e) => {
            warn!(root = %root.display(), error = %e, "failed to list install root");
            report.failed.push((root.to_path_buf(), e.to_string()));
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "failed to read install root entry");
                report.failed.push((root.to_path_buf(), e.to_string()));
                break;
            }
        };

        if entry.file_name() == keep {
            continue;
        }
        let is_dir = match entry.file_type().await {
            Ok(file_type) => file_type.is_dir(),
            Err(e) => {
                report.failed.push((entry.path(), e.to_string()));
                continue;
            }
        };
        if !is_dir {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "removed stale version");
                report.removed.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove stale version");
                report.failed.push((path, e.to_string()));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_root_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let report = sweep_except(&dir.path().join("absent"), "tool-1.0.0").await;
        assert!(report.removed.is_empty());
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_keeps_current_and_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("tool-0.9.0/nested")).unwrap();
        std::fs::create_dir_all(root.join("tool-1.0.0")).unwrap();
        std::fs::create_dir_all(root.join("leftover")).unwrap();
        std::fs::write(root.join("tool-1.0.0/tool"), b"bin").unwrap();
        std::fs::write(root.join("state.json"), b"{}").unwrap();

        let report = sweep_except(root, "tool-1.0.0").await;

        assert_eq!(report.removed.len(), 2);
        assert!(report.failed.is_empty());
        assert!(!root.join("tool-0.9.0").exists());
        assert!(!root.join("leftover").exists());
        assert!(root.join("tool-1.0.0/tool").exists());
        assert!(root.join("state.json").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_removal_does_not_stop_sweep() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let locked = root.join("tool-0.8.0/locked");
        std::fs::create_dir_all(&locked).unwrap();
        std::fs::write(locked.join("tool"), b"old").unwrap();
        std::fs::create_dir_all(root.join("tool-0.9.0")).unwrap();
        std::fs::create_dir_all(root.join("tool-1.0.0")).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users ignore directory permissions
        if std::fs::write(locked.join("writable"), b"").is_ok() {
            return;
        }

        let report = sweep_except(root, "tool-1.0.0").await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(report.removed, vec![root.join("tool-0.9.0")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, root.join("tool-0.8.0"));
        assert!(!root.join("tool-0.9.0").exists());
        assert!(root.join("tool-1.0.0").exists());
    }
}
