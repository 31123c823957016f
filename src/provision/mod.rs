//! Versioned binary provisioning.
//!
//! This module makes sure an executable language server exists locally.
//!
//! # Architecture
//!
//! The provisioning module is organized into:
//! - `platform`: host detection and derived file names
//! - `release`: release index lookup and the network seam
//! - `installer`: download, extraction and atomic install
//! - `store`: durable record of the installed version
//! - `sweep`: removal of superseded versions
//!
//! [`Provisioner`] composes them: an explicitly configured binary wins, then a
//! binary already on `PATH`, and only then is the latest release installed.

pub mod installer;
pub mod platform;
pub mod release;
pub mod store;
pub mod sweep;

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::LauncherConfig;
use crate::error::ProvisionError;
use crate::session::BinaryResolver;

pub use installer::{InstallStatus, InstalledVersion, Installer};
pub use platform::{Arch, Os, Platform};
pub use release::{GithubClient, ReleaseClient, ReleaseDescriptor, ReleaseVersion, find_latest};
pub use store::VersionStore;
pub use sweep::{SweepReport, sweep_except};

/// Result type for provisioning operations.
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

/// Resolves an executable server binary, installing one when needed.
#[derive(Debug)]
pub struct Provisioner<C> {
    installer: Installer<C>,
    binary_name: String,
    server_path: Option<PathBuf>,
    skip_path_lookup: bool,
    deadline: Duration,
    /// Install validated by this process; later resolutions reuse it offline.
    validated: Mutex<Option<InstalledVersion>>,
}

impl<C: ReleaseClient> Provisioner<C> {
    /// Creates a provisioner for the host platform.
    ///
    /// ## Errors
    /// Returns [`ProvisionError::Platform`] on unsupported hosts.
    pub fn new(config: &LauncherConfig, client: C) -> ProvisionResult<Self> {
        Ok(Self::with_platform(config, client, Platform::current()?))
    }

    /// Creates a provisioner for an explicit platform.
    pub fn with_platform(config: &LauncherConfig, client: C, platform: Platform) -> Self {
        let store = VersionStore::open(config.state_path());
        Self {
            installer: Installer::new(
                client,
                platform,
                &config.binary_name,
                &config.install_root,
                store,
            ),
            binary_name: config.binary_name.clone(),
            server_path: config.server_path.clone(),
            skip_path_lookup: config.skip_path_lookup,
            deadline: config.network_timeout,
            validated: Mutex::new(None),
        }
    }

    /// The underlying installer.
    pub fn installer(&self) -> &Installer<C> {
        &self.installer
    }

    /// Looks the binary up on the execution search path without running it.
    pub fn find_on_path(&self) -> Option<PathBuf> {
        let name = self
            .installer
            .platform()
            .executable_file_name(&self.binary_name);
        which::which(name).ok()
    }

    /// Installs the latest release, regardless of what is on `PATH`.
    ///
    /// ## Errors
    /// Release lookup and install failures are returned as-is;
    /// [`ProvisionError::Timeout`] if the deadline elapses first.
    pub async fn install_latest(&self) -> ProvisionResult<InstalledVersion> {
        match tokio::time::timeout(self.deadline, self.locate_and_install()).await {
            Ok(result) => {
                if let Ok(installed) = &result {
                    self.remember(installed.clone());
                }
                result
            }
            Err(_) => {
                let err = ProvisionError::Timeout(self.deadline);
                self.installer.publish(InstallStatus::Failed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn locate_and_install(&self) -> ProvisionResult<InstalledVersion> {
        self.installer.publish(InstallStatus::CheckingForUpdate);
        let descriptor = find_latest(
            self.installer.client(),
            self.installer.platform(),
            &self.binary_name,
        )
        .await
        .inspect_err(|e| {
            self.installer.publish(InstallStatus::Failed {
                message: e.to_string(),
            });
        })?;
        Ok(self.installer.install(&descriptor).await?)
    }

    fn remember(&self, installed: InstalledVersion) {
        *self.validated.lock().unwrap_or_else(PoisonError::into_inner) = Some(installed);
    }

    /// The install validated earlier in this process, if still on disk.
    async fn validated_install(&self) -> Option<InstalledVersion> {
        let installed = self
            .validated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        self.installer
            .store()
            .is_satisfied(&installed.version, &installed.binary_path)
            .await
            .then_some(installed)
    }

    /// Installs the latest release, falling back to the recorded install
    /// when the release index cannot be reached.
    async fn install_or_reuse(&self) -> ProvisionResult<InstalledVersion> {
        let err = match self.install_latest().await {
            Ok(installed) => return Ok(installed),
            Err(e) if e.is_unreachable() => e,
            Err(e) => return Err(e),
        };

        let Some(installed) = self.installer.installed().await else {
            return Err(err);
        };
        warn!(
            error = %err,
            version = %installed.version,
            "release index unavailable, using installed language server"
        );
        self.installer.publish(InstallStatus::Installed {
            version: installed.version.clone(),
        });
        self.remember(installed.clone());
        Ok(installed)
    }

    /// Resolves the binary to launch.
    ///
    /// Once an install has been validated, later calls reuse it without
    /// touching the network. When the release index is unreachable, the
    /// recorded install is used if its binary is present.
    ///
    /// ## Errors
    /// [`ProvisionError::ServerPathMissing`] for a dangling configured path,
    /// otherwise the errors of [`Provisioner::install_latest`] when nothing
    /// usable is installed.
    pub async fn resolve_path(&self) -> ProvisionResult<PathBuf> {
        if let Some(path) = &self.server_path {
            if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
                debug!(path = %path.display(), "using configured server binary");
                return Ok(path.clone());
            }
            return Err(ProvisionError::ServerPathMissing(path.clone()));
        }

        if !self.skip_path_lookup
            && let Some(path) = self.find_on_path()
        {
            info!(path = %path.display(), "using language server found on PATH");
            return Ok(path);
        }

        if let Some(installed) = self.validated_install().await {
            debug!(version = %installed.version, "reusing validated language server");
            return Ok(installed.binary_path);
        }

        let installed = self.install_or_reuse().await?;
        Ok(installed.binary_path)
    }
}

impl<C: ReleaseClient> BinaryResolver for Provisioner<C> {
    async fn resolve(&self) -> ProvisionResult<PathBuf> {
        self.resolve_path().await
    }
}
