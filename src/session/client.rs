//! Language server session over stdio.
//!
//! [`LspLauncher`] spawns the server binary and runs an `async-lsp` client
//! main loop over the child's standard streams. The session speaks just
//! enough of the protocol to own the process: the initialize handshake on
//! launch and the shutdown/exit handshake on teardown. Everything in between
//! belongs to the editor.
//!
//! ```ignore
//! use zap_launcher::session::{LaunchCommand, LspLauncher, Session, SessionLauncher};
//!
//! let launcher = LspLauncher::new(Duration::from_secs(30), Duration::from_secs(5));
//! let command = LaunchCommand::new(path, vec!["serve".into()], None);
//! let session = launcher.launch(&command).await?;
//! session.shutdown().await?;
//! ```

use std::ops::ControlFlow;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::panic::CatchUnwindLayer;
use async_lsp::router::Router;
use async_lsp::tracing::TracingLayer;
use async_lsp::{LanguageServer, ServerSocket};
use lsp_types::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializedParams, MessageType, ServerInfo,
    TraceValue, Url, WindowClientCapabilities, WorkDoneProgressParams, WorkspaceFolder,
    notification,
};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tracing::{debug, error, info, trace, warn};

use crate::error::SessionError;

use super::controller::{LaunchCommand, Session, SessionLauncher};

/// [`SessionLauncher`] that speaks LSP to the spawned server.
#[derive(Debug, Clone)]
pub struct LspLauncher {
    init_timeout: Duration,
    shutdown_timeout: Duration,
}

impl LspLauncher {
    /// Creates a launcher with the given handshake deadlines.
    pub fn new(init_timeout: Duration, shutdown_timeout: Duration) -> Self {
        Self {
            init_timeout,
            shutdown_timeout,
        }
    }
}

impl SessionLauncher for LspLauncher {
    type Session = LspSession;

    async fn launch(&self, command: &LaunchCommand) -> Result<LspSession, SessionError> {
        // Spawn the language server process
        let mut cmd = async_process::Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(root) = &command.workspace_root {
            cmd.current_dir(root);
        }

        let mut child = cmd.spawn().map_err(|e| {
            SessionError::SessionLaunchFailed(format!(
                "failed to spawn '{}': {e}",
                command.program.display()
            ))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SessionError::SessionLaunchFailed("failed to capture stdout".to_string())
        })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            SessionError::SessionLaunchFailed("failed to capture stdin".to_string())
        })?;

        let (mainloop, mut server) = async_lsp::MainLoop::new_client(|_client| {
            let mut router = Router::new(());

            router.notification::<notification::LogMessage>(|_, params| {
                log_server_message(params.typ, &params.message);
                ControlFlow::Continue(())
            });
            router.notification::<notification::ShowMessage>(|_, params| {
                log_server_message(params.typ, &params.message);
                ControlFlow::Continue(())
            });
            router.notification::<notification::PublishDiagnostics>(|_, params| {
                trace!(uri = %params.uri, count = params.diagnostics.len(), "diagnostics published");
                ControlFlow::Continue(())
            });
            router.notification::<notification::Progress>(|_, _progress| ControlFlow::Continue(()));

            // Editor-facing notifications are not ours to handle
            router.unhandled_notification(|_, notif| {
                trace!(method = %notif.method, "ignoring notification");
                ControlFlow::Continue(())
            });

            ServiceBuilder::new()
                .layer(TracingLayer::default())
                .layer(CatchUnwindLayer::default())
                .layer(ConcurrencyLayer::default())
                .service(router)
        });

        let mainloop_handle = tokio::spawn(async move {
            if let Err(e) = mainloop.run_buffered(stdout, stdin).await {
                debug!(error = ?e, "language server main loop ended");
            }
        });

        let init = initialize(&mut server, command.workspace_root.as_deref(), self.init_timeout).await;
        let server_info = match init {
            Ok(info) => info,
            Err(e) => {
                mainloop_handle.abort();
                child.kill().ok();
                return Err(e);
            }
        };

        if let Some(info) = &server_info {
            info!(
                name = %info.name,
                version = info.version.as_deref().unwrap_or("unknown"),
                pid = child.id(),
                "language server initialized"
            );
        }

        Ok(LspSession {
            server,
            child,
            mainloop: mainloop_handle,
            server_info,
            shutdown_timeout: self.shutdown_timeout,
        })
    }
}

async fn initialize(
    server: &mut ServerSocket,
    workspace_root: Option<&Path>,
    timeout: Duration,
) -> Result<Option<ServerInfo>, SessionError> {
    let workspace_folders = workspace_root
        .and_then(|root| {
            let uri = Url::from_file_path(root).ok()?;
            let name = root
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("workspace")
                .to_string();
            Some(vec![WorkspaceFolder { uri, name }])
        });

    let params = InitializeParams {
        process_id: Some(std::process::id()),
        workspace_folders,
        capabilities: ClientCapabilities {
            window: Some(WindowClientCapabilities {
                work_done_progress: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        },
        trace: Some(TraceValue::Off),
        client_info: Some(ClientInfo {
            name: "zap-launcher".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        work_done_progress_params: WorkDoneProgressParams::default(),
        ..Default::default()
    };

    let result = tokio::time::timeout(timeout, server.initialize(params))
        .await
        .map_err(|_| SessionError::Timeout(timeout))?
        .map_err(|e| SessionError::InitializationFailed(format!("initialize request failed: {e:?}")))?;

    server.initialized(InitializedParams {}).map_err(|e| {
        SessionError::InitializationFailed(format!("initialized notification failed: {e:?}"))
    })?;

    Ok(result.server_info)
}

fn log_server_message(typ: MessageType, message: &str) {
    match typ {
        MessageType::ERROR => error!(target: "zap_language_server", "{message}"),
        MessageType::WARNING => warn!(target: "zap_language_server", "{message}"),
        MessageType::INFO => info!(target: "zap_language_server", "{message}"),
        _ => debug!(target: "zap_language_server", "{message}"),
    }
}

/// A running language server and the client connected to it.
#[derive(Debug)]
pub struct LspSession {
    /// The language server handle for making requests.
    server: ServerSocket,
    /// The language server process (killed on drop).
    child: async_process::Child,
    /// Handle to the mainloop task.
    mainloop: JoinHandle<()>,
    server_info: Option<ServerInfo>,
    shutdown_timeout: Duration,
}

impl LspSession {
    /// Name and version the server reported, if any.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Process id of the server.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Socket for sending further requests to the server.
    pub fn server(&self) -> ServerSocket {
        self.server.clone()
    }
}

impl Session for LspSession {
    async fn shutdown(mut self) -> Result<(), SessionError> {
        let handshake =
            tokio::time::timeout(self.shutdown_timeout, self.server.shutdown(())).await;
        let result = match handshake {
            Ok(Ok(())) => self.server.exit(()).map_err(|e| {
                SessionError::ShutdownFailed(format!("exit notification failed: {e:?}"))
            }),
            Ok(Err(e)) => Err(SessionError::ShutdownFailed(format!(
                "shutdown request failed: {e:?}"
            ))),
            Err(_) => Err(SessionError::Timeout(self.shutdown_timeout)),
        };

        match tokio::time::timeout(self.shutdown_timeout, self.child.status()).await {
            Ok(Ok(status)) => debug!(%status, "language server exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for language server"),
            Err(_) => {
                warn!("language server did not exit, killing it");
                if let Err(e) = self.child.kill() {
                    warn!(error = %e, "failed to kill language server");
                }
            }
        }

        self.mainloop.abort();
        result
    }
}
