//! Release index lookup.
//!
//! The release index is the GitHub releases API. [`ReleaseClient`] is the
//! seam over the network so the installer can be driven without it;
//! [`GithubClient`] is the production implementation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::LauncherConfig;
use crate::error::{InstallError, ReleaseError};

use super::platform::Platform;

/// An opaque release version.
///
/// Only equality is meaningful. A single leading `v` is stripped on
/// construction so tags like `v1.2.0` and `1.2.0` name the same version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseVersion(String);

impl ReleaseVersion {
    /// Creates a version from a tag or version string.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);
        Self(stripped.to_string())
    }

    /// The version without marker.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A release resolved for this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    /// Version of the release.
    pub version: ReleaseVersion,
    /// Download URL of the platform artifact.
    pub download_url: String,
}

/// Release metadata as returned by the release index.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    /// Release tag, usually `v`-prefixed.
    pub tag_name: String,
    /// Published artifacts.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A single published artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    /// File name of the artifact.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

/// Network access needed by provisioning.
pub trait ReleaseClient: Send + Sync {
    /// Fetches metadata of the latest published release.
    fn latest_release(&self) -> impl Future<Output = Result<Release, ReleaseError>> + Send;

    /// Downloads an artifact in full.
    fn download(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, InstallError>> + Send;
}

/// [`ReleaseClient`] backed by the GitHub releases API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    repository: String,
}

impl GithubClient {
    /// Creates a client for the repository named in `config`.
    ///
    /// ## Errors
    /// Returns [`ReleaseError::ReleaseQueryFailed`] if the HTTP client cannot
    /// be constructed.
    pub fn new(config: &LauncherConfig) -> Result<Self, ReleaseError> {
        Self::with_timeout(&config.api_base, &config.repository, config.network_timeout)
    }

    /// Creates a client for an explicit API base and repository.
    ///
    /// ## Errors
    /// Returns [`ReleaseError::ReleaseQueryFailed`] if the HTTP client cannot
    /// be constructed.
    pub fn with_timeout(
        api_base: &str,
        repository: &str,
        timeout: Duration,
    ) -> Result<Self, ReleaseError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("zap-launcher/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ReleaseError::ReleaseQueryFailed(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            repository: repository.to_string(),
        })
    }

    fn latest_release_url(&self) -> String {
        format!("{}/repos/{}/releases/latest", self.api_base, self.repository)
    }
}

impl ReleaseClient for GithubClient {
    async fn latest_release(&self) -> Result<Release, ReleaseError> {
        let url = self.latest_release_url();
        debug!(%url, "querying latest release");

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ReleaseError::ReleaseQueryFailed(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ReleaseError::ReleaseQueryFailed(format!(
                "{url} returned HTTP {}",
                response.status()
            )));
        }

        response.json::<Release>().await.map_err(|e| {
            ReleaseError::ReleaseQueryFailed(format!("failed to parse release JSON: {e}"))
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, InstallError> {
        let failed = |reason: String| InstallError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        debug!(url, size = bytes.len(), "downloaded release artifact");
        Ok(bytes.to_vec())
    }
}

/// Resolves the latest release artifact for `platform`.
///
/// The artifact is matched by exact name against
/// `{binary}-{version}-{os}-{arch}.zip`; the first match wins.
///
/// ## Errors
/// [`ReleaseError::ReleaseQueryFailed`] if the index cannot be queried and
/// [`ReleaseError::NoMatchingAsset`] if no artifact has the expected name.
pub async fn find_latest<C: ReleaseClient>(
    client: &C,
    platform: Platform,
    binary: &str,
) -> Result<ReleaseDescriptor, ReleaseError> {
    let release = client.latest_release().await?;
    let descriptor = select_asset(&release, platform, binary)?;
    info!(
        version = %descriptor.version,
        url = %descriptor.download_url,
        "found latest release"
    );
    Ok(descriptor)
}

fn select_asset(
    release: &Release,
    platform: Platform,
    binary: &str,
) -> Result<ReleaseDescriptor, ReleaseError> {
    let version = ReleaseVersion::new(&release.tag_name);
    let expected = platform.release_asset_name(binary, &version);

    match release.assets.iter().find(|asset| asset.name == expected) {
        Some(asset) => Ok(ReleaseDescriptor {
            version,
            download_url: asset.browser_download_url.clone(),
        }),
        None => Err(ReleaseError::NoMatchingAsset {
            expected,
            version: version.to_string(),
            available: release.assets.iter().map(|a| a.name.clone()).collect(),
        }),
    }
}
