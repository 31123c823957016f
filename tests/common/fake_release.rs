//! In-memory release index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zap_launcher::error::{InstallError, ReleaseError};
use zap_launcher::provision::release::{Release, ReleaseAsset};
use zap_launcher::provision::{Platform, ReleaseClient, ReleaseDescriptor, ReleaseVersion};

use super::{BINARY, zip_archive};

/// A [`ReleaseClient`] serving canned releases and archives, counting calls.
#[derive(Debug, Clone, Default)]
pub struct FakeReleaseClient {
    release: Arc<Mutex<Option<Release>>>,
    archives: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    delay: Duration,
    download_delay: Arc<Mutex<Duration>>,
    queries: Arc<AtomicUsize>,
    downloads: Arc<AtomicUsize>,
}

impl FakeReleaseClient {
    /// Creates a client with no published release.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delays downloads, on top of any delay set with
    /// [`FakeReleaseClient::with_delay`], from now on.
    /// ## Panics
    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock().unwrap() = delay;
    }

    /// Publishes `tag` with assets named `asset_names`, all serving `archive`.
    /// ## Panics
    pub fn publish(&self, tag: &str, asset_names: &[&str], archive: &[u8]) {
        let assets: Vec<ReleaseAsset> = asset_names
            .iter()
            .map(|name| ReleaseAsset {
                name: (*name).to_string(),
                browser_download_url: format!("https://downloads.invalid/{tag}/{name}"),
            })
            .collect();

        let mut archives = self.archives.lock().unwrap();
        for asset in &assets {
            archives.insert(asset.browser_download_url.clone(), archive.to_vec());
        }
        *self.release.lock().unwrap() = Some(Release {
            tag_name: tag.to_string(),
            assets,
        });
    }

    /// Publishes a well-formed release of the fixture binary for `platform`
    /// and returns the descriptor the locator should produce for it.
    pub fn publish_binary(
        &self,
        platform: Platform,
        tag: &str,
        contents: &[u8],
    ) -> ReleaseDescriptor {
        let version = ReleaseVersion::new(tag);
        let asset = platform.release_asset_name(BINARY, &version);
        let exe = platform.executable_file_name(BINARY);
        let archive = zip_archive(&[("README.md", b"readme"), (exe.as_str(), contents)]);
        self.publish(tag, &[asset.as_str()], &archive);
        ReleaseDescriptor {
            version,
            download_url: format!("https://downloads.invalid/{tag}/{asset}"),
        }
    }

    /// Number of release index queries made.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of artifact downloads made.
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl ReleaseClient for FakeReleaseClient {
    async fn latest_release(&self) -> Result<Release, ReleaseError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.release
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ReleaseError::ReleaseQueryFailed("HTTP 404 Not Found".to_string()))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, InstallError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let extra = *self.download_delay.lock().unwrap();
        tokio::time::sleep(self.delay + extra).await;
        self.archives
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| InstallError::DownloadFailed {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })
    }
}
