//! Zap Launcher - Entry Point
//!
//! Command-line front-end over the launcher library. It sets up logging,
//! parses arguments, and then installs, locates or runs the language server.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use zap_launcher::provision::InstallStatus;
use zap_launcher::session::{BinaryResolver, SessionController, SessionLauncher};
use zap_launcher::{AppContext, LauncherConfig};

/// Provisions and supervises the Zap language server.
#[derive(Parser, Debug)]
#[command(name = "zap-launcher")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory holding installed server versions.
    #[arg(long, global = true, env = "ZAP_LAUNCHER_INSTALL_ROOT")]
    install_root: Option<PathBuf>,

    /// GitHub repository (`owner/name`) publishing server releases.
    #[arg(long, global = true, env = "ZAP_LAUNCHER_REPOSITORY")]
    repository: Option<String>,

    /// Use this server binary instead of searching or downloading one.
    #[arg(long, global = true, env = "ZAP_LANGUAGE_SERVER_PATH")]
    server_path: Option<PathBuf>,

    /// Ignore a server binary found on PATH.
    #[arg(long, global = true)]
    no_path_lookup: bool,

    /// Network deadline in seconds.
    #[arg(long, global = true, default_value_t = 60)]
    network_timeout: u64,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install the latest release, even if a server is on PATH.
    Install,
    /// Print the server binary that would be launched, installing it if needed.
    Path,
    /// Show the recorded installed version.
    Status,
    /// Start the language server and supervise it until interrupted.
    ///
    /// On Unix, SIGHUP restarts the server.
    Run {
        /// Workspace root announced to the server.
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },
}

impl Args {
    /// Parses the log level string into a tracing Level.
    fn parse_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => anyhow::bail!("invalid log level: {}", other),
        }
    }

    /// Maps the arguments onto a launcher configuration.
    fn to_config(&self) -> Result<LauncherConfig> {
        let mut builder = LauncherConfig::builder()
            .skip_path_lookup(self.no_path_lookup)
            .network_timeout(Duration::from_secs(self.network_timeout));

        if let Some(root) = &self.install_root {
            builder = builder.install_root(root);
        }
        if let Some(repository) = &self.repository {
            builder = builder.repository(repository);
        }
        if let Some(path) = &self.server_path {
            builder = builder.server_path(path);
        }
        if let Command::Run { workspace } = &self.command {
            let workspace = workspace.canonicalize().context(format!(
                "failed to canonicalize workspace path: {}",
                workspace.display()
            ))?;
            builder = builder.workspace_root(workspace);
        }

        builder.build().context("invalid launcher configuration")
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(level: Level, json: bool) -> Result<()> {
    // Create an env filter that respects RUST_LOG but has a default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "zap_launcher={level},zap_language_server={level},async_lsp={level}"
        ))
    });

    // Logs go to stderr; stdout carries command output
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    };
    installed.context("failed to initialize tracing subscriber")?;

    Ok(())
}

/// Logs installation progress until the installer goes away.
fn report_install_progress(context: &AppContext) {
    let mut status = context.provisioner().installer().subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match current {
                InstallStatus::Idle => {}
                InstallStatus::CheckingForUpdate => info!("checking for language server updates"),
                InstallStatus::Downloading { version } => {
                    info!(%version, "downloading language server");
                }
                InstallStatus::Installed { version } => info!(%version, "language server ready"),
                InstallStatus::Failed { message } => warn!(%message, "language server install failed"),
            }
        }
    });
}

/// Forwards SIGHUP to `restarts` (Unix only; elsewhere the channel closes).
#[cfg(unix)]
fn forward_hangups(restarts: mpsc::Sender<()>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!(error = %e, "SIGHUP restarts unavailable");
            return;
        }
    };
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            if restarts.send(()).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(not(unix))]
fn forward_hangups(_restarts: mpsc::Sender<()>) {}

/// Keeps the session alive until `shutdown` resolves, restarting it on each
/// request. A pending restart never delays shutdown.
async fn supervise<R, L, S>(
    controller: &SessionController<R, L>,
    shutdown: S,
    restarts: &mut mpsc::Receiver<()>,
) -> Result<()>
where
    R: BinaryResolver,
    L: SessionLauncher,
    S: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for shutdown signal")?;
                break;
            }
            Some(()) = restarts.recv() => {
                info!("restarting language server");
                tokio::select! {
                    result = controller.restart() => {
                        if let Err(e) = result {
                            error!(error = %e, "language server restart failed");
                        }
                    }
                    result = &mut shutdown => {
                        result.context("failed to listen for shutdown signal")?;
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn run(context: &AppContext) -> Result<()> {
    context
        .controller()
        .start()
        .await
        .context("failed to start language server")?;

    let (restart_tx, mut restarts) = mpsc::channel(1);
    forward_hangups(restart_tx);
    supervise(context.controller(), tokio::signal::ctrl_c(), &mut restarts).await?;

    info!("shutdown requested");
    Ok(())
}

/// Runs one subcommand against the context.
async fn execute(command: &Command, context: &AppContext) -> Result<()> {
    match command {
        Command::Install => {
            let installed = context
                .provisioner()
                .install_latest()
                .await
                .context("failed to install language server")?;
            println!("{}", installed.binary_path.display());
        }
        Command::Path => {
            let path = context
                .provisioner()
                .resolve_path()
                .await
                .context("failed to resolve language server")?;
            println!("{}", path.display());
        }
        Command::Status => match context.provisioner().installer().installed().await {
            Some(installed) => {
                println!("{} {}", installed.version, installed.binary_path.display());
            }
            None => println!("not installed"),
        },
        Command::Run { .. } => run(context).await?,
    }
    Ok(())
}

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = args.parse_log_level()?;
    init_tracing(log_level, args.log_json)?;

    let config = args.to_config()?;
    info!(
        install_root = %config.install_root.display(),
        repository = %config.repository,
        "starting zap-launcher"
    );

    let context = AppContext::init(config).context("failed to initialize launcher")?;
    report_install_progress(&context);

    let result = execute(&args.command, &context).await;

    context.teardown().await;
    result
}
