//! Launcher configuration.
//!
//! [`LauncherConfig`] holds every knob the provisioning pipeline and the
//! session controller need. Build it with [`LauncherConfig::builder`]; the
//! defaults target the published Zap language server releases.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Name of the language server binary, without platform suffix.
pub const DEFAULT_BINARY_NAME: &str = "zap-language-server";

/// GitHub repository publishing the language server releases.
pub const DEFAULT_REPOSITORY: &str = "zap-lang/zap-language-server";

/// Base URL of the release index API.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Name of the durable state file inside the install root.
pub const STATE_FILE_NAME: &str = "state.json";

/// Configuration shared by the provisioner and the session controller.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Binary name, without the `.exe` suffix.
    pub binary_name: String,
    /// `owner/name` of the repository whose releases are installed.
    pub repository: String,
    /// Base URL of the release index API.
    pub api_base: String,
    /// Directory holding one subdirectory per installed version.
    pub install_root: PathBuf,
    /// Explicit server binary; disables search-path lookup and downloads.
    pub server_path: Option<PathBuf>,
    /// Skip the search-path probe and always use a provisioned binary.
    pub skip_path_lookup: bool,
    /// Arguments passed to the server binary.
    pub server_args: Vec<String>,
    /// Workspace announced to the server during initialization.
    pub workspace_root: Option<PathBuf>,
    /// Deadline for the whole provisioning pipeline, and for each HTTP request.
    pub network_timeout: Duration,
    /// Deadline for the initialize handshake.
    pub init_timeout: Duration,
    /// Deadline for the shutdown handshake before the process is killed.
    pub shutdown_timeout: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            repository: DEFAULT_REPOSITORY.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            install_root: default_install_root(),
            server_path: None,
            skip_path_lookup: false,
            server_args: vec!["serve".to_string()],
            workspace_root: None,
            network_timeout: Duration::from_secs(60),
            init_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl LauncherConfig {
    /// Creates a new builder with default configuration.
    pub fn builder() -> LauncherConfigBuilder {
        LauncherConfigBuilder::new()
    }

    /// Path of the installed-version record.
    pub fn state_path(&self) -> PathBuf {
        self.install_root.join(STATE_FILE_NAME)
    }

    /// Checks that the configuration can be acted upon.
    ///
    /// ## Errors
    /// Returns [`Error::Config`] for empty names or a malformed repository.
    pub fn validate(&self) -> Result<(), Error> {
        if self.binary_name.trim().is_empty() {
            return Err(Error::Config("binary name must not be empty".to_string()));
        }
        match self.repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {}
            _ => {
                return Err(Error::Config(format!(
                    "repository must look like 'owner/name', got '{}'",
                    self.repository
                )));
            }
        }
        if self.install_root.as_os_str().is_empty() {
            return Err(Error::Config("install root must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Install root used when none is configured.
///
/// Falls back to a directory under the system temp dir on hosts without a
/// local data directory.
pub fn default_install_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("zap-launcher")
        .join("bin")
}

/// Builder for [`LauncherConfig`].
#[derive(Debug, Default)]
pub struct LauncherConfigBuilder {
    config: LauncherConfig,
}

impl LauncherConfigBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the binary name.
    #[must_use]
    pub fn binary_name(mut self, name: impl Into<String>) -> Self {
        self.config.binary_name = name.into();
        self
    }

    /// Sets the release repository (`owner/name`).
    #[must_use]
    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.config.repository = repository.into();
        self
    }

    /// Sets the release index API base URL.
    #[must_use]
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.config.api_base = api_base.into();
        self
    }

    /// Sets the install root.
    #[must_use]
    pub fn install_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.install_root = path.into();
        self
    }

    /// Pins the server binary to an explicit path.
    #[must_use]
    pub fn server_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.server_path = Some(path.into());
        self
    }

    /// Disables the search-path probe.
    #[must_use]
    pub fn skip_path_lookup(mut self, skip: bool) -> Self {
        self.config.skip_path_lookup = skip;
        self
    }

    /// Sets the server arguments.
    #[must_use]
    pub fn server_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.server_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the workspace root.
    #[must_use]
    pub fn workspace_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = Some(path.into());
        self
    }

    /// Sets the network deadline.
    #[must_use]
    pub fn network_timeout(mut self, timeout: Duration) -> Self {
        self.config.network_timeout = timeout;
        self
    }

    /// Sets the initialization timeout.
    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// ## Errors
    /// See [`LauncherConfig::validate`].
    pub fn build(self) -> Result<LauncherConfig, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LauncherConfig::default();
        assert_eq!(config.binary_name, "zap-language-server");
        assert_eq!(config.server_args, vec!["serve".to_string()]);
        assert!(config.install_root.ends_with("zap-launcher/bin"));
        assert_eq!(config.state_path(), config.install_root.join("state.json"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = LauncherConfig::builder()
            .binary_name("tool")
            .repository("acme/tool")
            .install_root("/tmp/tool-bin")
            .skip_path_lookup(true)
            .network_timeout(Duration::from_secs(3))
            .build()
            .unwrap();
        assert_eq!(config.binary_name, "tool");
        assert_eq!(config.repository, "acme/tool");
        assert_eq!(config.install_root, PathBuf::from("/tmp/tool-bin"));
        assert!(config.skip_path_lookup);
        assert_eq!(config.network_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_malformed_repository() {
        let result = LauncherConfig::builder().repository("no-slash").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("owner/name")));
    }

    #[test]
    fn test_rejects_empty_binary_name() {
        let result = LauncherConfig::builder().binary_name("  ").build();
        assert!(result.is_err());
    }
}
