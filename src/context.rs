//! Application context.
//!
//! [`AppContext`] is the explicit owner of everything that lives for the
//! whole editor session: the configuration, the provisioner and the one
//! session controller. Create it once at startup with [`AppContext::init`]
//! and hand it back with [`AppContext::teardown`] at shutdown.

use tracing::{debug, info};

use crate::config::LauncherConfig;
use crate::error::{ProvisionError, Result};
use crate::provision::{GithubClient, Provisioner};
use crate::session::{LspLauncher, SessionController};

/// Session controller wired to the production provisioner and launcher.
pub type LspController = SessionController<Provisioner<GithubClient>, LspLauncher>;

/// Process-wide state of the launcher.
#[derive(Debug)]
pub struct AppContext {
    config: LauncherConfig,
    controller: LspController,
}

impl AppContext {
    /// Builds the context from `config`.
    ///
    /// ## Errors
    /// Returns an error for invalid configuration, an unsupported host, or
    /// an HTTP client that cannot be constructed.
    pub fn init(config: LauncherConfig) -> Result<Self> {
        config.validate()?;

        let client = GithubClient::new(&config).map_err(ProvisionError::from)?;
        let provisioner = Provisioner::new(&config, client)?;
        let launcher = LspLauncher::new(config.init_timeout, config.shutdown_timeout);
        let controller = SessionController::new(
            provisioner,
            launcher,
            config.server_args.clone(),
            config.workspace_root.clone(),
        );

        debug!(install_root = %config.install_root.display(), "launcher context initialized");
        Ok(Self { config, controller })
    }

    /// The configuration the context was built from.
    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// The session controller.
    pub fn controller(&self) -> &LspController {
        &self.controller
    }

    /// The provisioner used by the controller.
    pub fn provisioner(&self) -> &Provisioner<GithubClient> {
        self.controller.resolver()
    }

    /// Stops any running session and releases the context.
    pub async fn teardown(self) {
        if self.controller.stop().await {
            info!("language server stopped");
        }
    }
}
