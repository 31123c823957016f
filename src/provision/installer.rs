//! Artifact installation.
//!
//! [`Installer::install`] turns a [`ReleaseDescriptor`] into an executable
//! binary under the install root. The version record is written last, after
//! the binary has been renamed into place, so an interrupted or failed install
//! never leaves the record pointing at a partial file.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::InstallError;

use super::platform::Platform;
use super::release::{ReleaseClient, ReleaseDescriptor, ReleaseVersion};
use super::store::VersionStore;
use super::sweep::sweep_except;

/// Installation progress, for editors that surface it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
    /// Nothing has happened yet.
    Idle,
    /// The release index is being queried.
    CheckingForUpdate,
    /// An artifact is being downloaded and written.
    Downloading {
        /// Version being installed.
        version: ReleaseVersion,
    },
    /// A version is installed and ready.
    Installed {
        /// Installed version.
        version: ReleaseVersion,
    },
    /// The last attempt failed.
    Failed {
        /// Diagnostic message.
        message: String,
    },
}

/// A binary that is installed and recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    /// Installed version.
    pub version: ReleaseVersion,
    /// Absolute path of the executable.
    pub binary_path: PathBuf,
}

/// Installs release artifacts into versioned directories.
#[derive(Debug)]
pub struct Installer<C> {
    client: C,
    platform: Platform,
    binary_name: String,
    install_root: PathBuf,
    store: VersionStore,
    status: watch::Sender<InstallStatus>,
}

impl<C: ReleaseClient> Installer<C> {
    /// Creates an installer writing below `install_root`.
    pub fn new(
        client: C,
        platform: Platform,
        binary_name: impl Into<String>,
        install_root: impl Into<PathBuf>,
        store: VersionStore,
    ) -> Self {
        let (status, _) = watch::channel(InstallStatus::Idle);
        Self {
            client,
            platform,
            binary_name: binary_name.into(),
            install_root: install_root.into(),
            store,
            status,
        }
    }

    /// The release client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The platform binaries are installed for.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The version store.
    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Subscribes to installation progress.
    pub fn subscribe(&self) -> watch::Receiver<InstallStatus> {
        self.status.subscribe()
    }

    pub(crate) fn publish(&self, status: InstallStatus) {
        self.status.send_replace(status);
    }

    /// Directory holding `version`.
    pub fn version_dir(&self, version: &ReleaseVersion) -> PathBuf {
        self.install_root
            .join(Platform::version_dir_name(&self.binary_name, version))
    }

    /// Path of the executable for `version`.
    pub fn binary_path(&self, version: &ReleaseVersion) -> PathBuf {
        self.version_dir(version)
            .join(self.platform.executable_file_name(&self.binary_name))
    }

    /// Returns the recorded installation, if its binary is present.
    pub async fn installed(&self) -> Option<InstalledVersion> {
        let version = self.store.get().await?;
        let binary_path = self.binary_path(&version);
        self.store
            .is_satisfied(&version, &binary_path)
            .await
            .then_some(InstalledVersion {
                version,
                binary_path,
            })
    }

    /// Installs `descriptor`, skipping all network access when the recorded
    /// version already matches and its binary is present.
    ///
    /// On success the previous version directories are swept.
    ///
    /// ## Errors
    /// Any download, extraction or write failure aborts the install and
    /// leaves the version record untouched.
    pub async fn install(
        &self,
        descriptor: &ReleaseDescriptor,
    ) -> Result<InstalledVersion, InstallError> {
        let version = &descriptor.version;
        let version_dir = self.version_dir(version);
        let binary_path = self.binary_path(version);

        if self.store.is_satisfied(version, &binary_path).await {
            debug!(%version, path = %binary_path.display(), "release already installed");
            self.publish(InstallStatus::Installed {
                version: version.clone(),
            });
            return Ok(InstalledVersion {
                version: version.clone(),
                binary_path,
            });
        }

        self.publish(InstallStatus::Downloading {
            version: version.clone(),
        });
        info!(%version, url = %descriptor.download_url, "installing release");

        if let Err(e) = self
            .fetch_and_write(descriptor, &version_dir, &binary_path)
            .await
        {
            self.publish(InstallStatus::Failed {
                message: e.to_string(),
            });
            return Err(e);
        }

        if let Err(e) = self.store.set(version).await {
            self.publish(InstallStatus::Failed {
                message: e.to_string(),
            });
            return Err(e);
        }
        info!(%version, path = %binary_path.display(), "release installed");

        let keep = Platform::version_dir_name(&self.binary_name, version);
        let report = sweep_except(&self.install_root, &keep).await;
        if !report.failed.is_empty() {
            warn!(count = report.failed.len(), "some stale versions could not be removed");
        }

        self.publish(InstallStatus::Installed {
            version: version.clone(),
        });
        Ok(InstalledVersion {
            version: version.clone(),
            binary_path,
        })
    }

    async fn fetch_and_write(
        &self,
        descriptor: &ReleaseDescriptor,
        version_dir: &Path,
        binary_path: &Path,
    ) -> Result<(), InstallError> {
        let archive = self.client.download(&descriptor.download_url).await?;

        let file_name = self.platform.executable_file_name(&self.binary_name);
        let binary = tokio::task::spawn_blocking(move || extract_binary(archive, &file_name))
            .await
            .map_err(|e| InstallError::InvalidArchive(format!("extraction task failed: {e}")))??;

        write_binary(
            version_dir,
            binary_path,
            &binary,
            self.platform.is_unix_like(),
        )
        .await
    }
}

/// Returns the contents of the archive entry named exactly `file_name`.
fn extract_binary(archive: Vec<u8>, file_name: &str) -> Result<Vec<u8>, InstallError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| InstallError::InvalidArchive(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(index, error = %e, "skipping unreadable archive entry");
                continue;
            }
        };
        if entry.name() != file_name {
            continue;
        }

        // The declared size is untrusted, so no preallocation from it
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).map_err(|e| {
            InstallError::InvalidArchive(format!("failed to extract \"{file_name}\": {e}"))
        })?;
        return Ok(contents);
    }

    Err(InstallError::BinaryNotFoundInArchive(file_name.to_string()))
}

/// Writes `contents` to `binary_path` through a sibling temporary file.
async fn write_binary(
    version_dir: &Path,
    binary_path: &Path,
    contents: &[u8],
    unix_like: bool,
) -> Result<(), InstallError> {
    tokio::fs::create_dir_all(version_dir)
        .await
        .map_err(|source| InstallError::WriteFailed {
            path: version_dir.to_path_buf(),
            source,
        })?;

    let partial = binary_path.with_extension("partial");
    let result = async {
        tokio::fs::write(&partial, contents).await?;
        if unix_like {
            make_executable(&partial).await?;
        }
        tokio::fs::rename(&partial, binary_path).await
    }
    .await;

    if let Err(source) = result {
        tokio::fs::remove_file(&partial).await.ok();
        return Err(InstallError::WriteFailed {
            path: binary_path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use zip::write::SimpleFileOptions;

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_scans_past_other_entries() {
        let archive = zip_of(&[
            ("README.md", b"docs"),
            ("LICENSE", b"mit"),
            ("tool", b"binary"),
        ]);
        assert_eq!(extract_binary(archive, "tool").unwrap(), b"binary");
    }

    #[test]
    fn test_extract_requires_exact_name() {
        let archive = zip_of(&[("bin/tool", b"nested"), ("tool-helper", b"other")]);
        let err = extract_binary(archive, "tool").unwrap_err();
        assert!(matches!(err, InstallError::BinaryNotFoundInArchive(name) if name == "tool"));
    }

    #[test]
    fn test_extract_ignores_declared_size() {
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("tool", options).unwrap();
        writer.write_all(b"binary").unwrap();
        let mut archive = writer.finish().unwrap().into_inner();

        // Claim a ~4 GiB uncompressed size in the local and central headers
        let huge = (u32::MAX - 1).to_le_bytes();
        for (signature, offset) in [([0x50_u8, 0x4b, 0x03, 0x04], 22), ([0x50_u8, 0x4b, 0x01, 0x02], 24)] {
            let at = archive.windows(4).position(|w| w == signature).unwrap();
            archive[at + offset..at + offset + 4].copy_from_slice(&huge);
        }

        // Either outcome is fine as long as it is returned rather than aborting
        match extract_binary(archive, "tool") {
            Ok(contents) => assert_eq!(contents, b"binary"),
            Err(InstallError::InvalidArchive(_) | InstallError::BinaryNotFoundInArchive(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let err = extract_binary(b"not a zip".to_vec(), "tool").unwrap_err();
        assert!(matches!(err, InstallError::InvalidArchive(_)));
    }

    #[tokio::test]
    async fn test_write_binary_leaves_no_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let version_dir = dir.path().join("tool-1.0.0");
        let binary = version_dir.join("tool");

        write_binary(&version_dir, &binary, b"payload", cfg!(unix))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&binary).unwrap(), b"payload");
        assert!(!version_dir.join("tool.partial").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&binary).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }
}
