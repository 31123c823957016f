//! Error types for zap-launcher.
//!
//! Errors are organized by subsystem: platform detection, release lookup,
//! artifact installation, provisioning as a whole, and session lifecycle.
//! The unified [`Error`] wraps all of them for callers that do not care
//! which stage failed.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while identifying the host platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The operating system or CPU architecture has no published artifact.
    #[error("unsupported platform: {os}-{arch}")]
    UnsupportedPlatform {
        /// The host operating system as reported by the standard library.
        os: String,
        /// The host architecture as reported by the standard library.
        arch: String,
    },
}

/// Errors raised while querying the release index.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The release index could not be reached or returned garbage.
    #[error("failed to query latest release: {0}")]
    ReleaseQueryFailed(String),

    /// The latest release carries no artifact for this platform.
    #[error(
        "no release asset named \"{expected}\" in release {version}; found release assets: {}",
        .available.join(", ")
    )]
    NoMatchingAsset {
        /// The artifact name that was looked for.
        expected: String,
        /// The release version that was inspected.
        version: String,
        /// Every asset name published with the release, verbatim.
        available: Vec<String>,
    },
}

/// Errors raised while installing a release artifact.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The artifact could not be downloaded.
    #[error("failed to download {url}: {reason}")]
    DownloadFailed {
        /// The artifact URL.
        url: String,
        /// Transport or HTTP status failure.
        reason: String,
    },

    /// The downloaded bytes are not a readable zip archive.
    #[error("downloaded artifact is not a valid archive: {0}")]
    InvalidArchive(String),

    /// The archive has no entry with the expected binary name.
    #[error("failed to find \"{0}\" in the release archive")]
    BinaryNotFoundInArchive(String),

    /// The binary could not be written into its version directory.
    #[error("failed to write {path}: {source}")]
    WriteFailed {
        /// Path that was being created or written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The installed-version record could not be persisted.
    #[error("failed to record installed version in {path}: {reason}")]
    StateWriteFailed {
        /// Path of the state file.
        path: PathBuf,
        /// Serialization or IO failure.
        reason: String,
    },
}

/// Errors raised by the provisioning pipeline.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Platform detection failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Release lookup failed.
    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// Installation failed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// A configured server path does not point at a file.
    #[error("configured server path does not exist: {0}")]
    ServerPathMissing(PathBuf),

    /// Provisioning did not finish within the configured deadline.
    #[error("provisioning timed out after {0:?}")]
    Timeout(Duration),
}

impl ProvisionError {
    /// Whether the failure came from the network rather than the local
    /// install.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Release(ReleaseError::ReleaseQueryFailed(_))
                | Self::Install(InstallError::DownloadFailed { .. })
                | Self::Timeout(_)
        )
    }
}

/// Errors raised by the session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session is already starting or running.
    #[error("language server has already been started")]
    AlreadyStarted,

    /// A stop abandoned the start before it completed.
    #[error("language server start was cancelled")]
    Cancelled,

    /// No executable could be provisioned for the session.
    #[error("failed to provision language server: {0}")]
    Provision(#[from] ProvisionError),

    /// The server process could not be spawned.
    #[error("failed to launch language server: {0}")]
    SessionLaunchFailed(String),

    /// The initialize handshake failed.
    #[error("language server initialization failed: {0}")]
    InitializationFailed(String),

    /// The shutdown handshake failed.
    #[error("language server shutdown failed: {0}")]
    ShutdownFailed(String),

    /// A handshake step timed out.
    #[error("language server did not respond within {0:?}")]
    Timeout(Duration),
}

/// A unified error type for the entire crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Provisioning error.
    #[error("provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for zap-launcher operations.
pub type Result<T> = std::result::Result<T, Error>;
