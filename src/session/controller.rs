//! Session lifecycle controller.
//!
//! [`SessionController`] owns at most one running session. Starting is not
//! idempotent: a second `start` fails with [`SessionError::AlreadyStarted`]
//! so two sessions never compete for the same workspace. Stopping is: a
//! `stop` with nothing running reports `false`, and a `stop` while starting
//! abandons the start.
//!
//! Transitions are decided under a lock that is released before any
//! provisioning, launch or shutdown work is awaited.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::error::{ProvisionError, SessionError};

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session exists.
    Stopped,
    /// A session is being resolved and launched.
    Starting,
    /// A session is running.
    Running,
}

/// Produces the path of the server executable.
pub trait BinaryResolver: Send + Sync {
    /// Resolves an executable, provisioning one if necessary.
    fn resolve(&self) -> impl Future<Output = Result<PathBuf, ProvisionError>> + Send;
}

/// A running session that can be torn down.
pub trait Session: Send {
    /// Shuts the session down, consuming it.
    fn shutdown(self) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Launches sessions.
pub trait SessionLauncher: Send + Sync {
    /// The session type produced.
    type Session: Session;

    /// Spawns the server described by `command` and connects a client to it.
    fn launch(
        &self,
        command: &LaunchCommand,
    ) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}

/// Everything needed to spawn the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments to pass.
    pub args: Vec<String>,
    /// Environment variables set explicitly on the child.
    pub env: Vec<(String, OsString)>,
    /// Working directory and workspace announced to the server.
    pub workspace_root: Option<PathBuf>,
}

impl LaunchCommand {
    /// Creates a command that inherits the caller's `PATH`.
    pub fn new(program: PathBuf, args: Vec<String>, workspace_root: Option<PathBuf>) -> Self {
        let env = std::env::var_os("PATH")
            .map(|path| vec![("PATH".to_string(), path)])
            .unwrap_or_default();
        Self {
            program,
            args,
            env,
            workspace_root,
        }
    }
}

/// Bookkeeping guarded by the controller's short-lived lock.
struct Slot<S> {
    session: Option<S>,
    pending: Option<PendingStart>,
    attempts: u64,
}

/// An in-flight start; dropping `cancel` abandons it.
struct PendingStart {
    id: u64,
    cancel: oneshot::Sender<()>,
}

/// Resets the published state to `Stopped` unless disarmed, so a failed or
/// cancelled start never leaves the controller stuck in `Starting`.
struct StartingGuard<'a, S> {
    slot: &'a Mutex<Slot<S>>,
    state: &'a watch::Sender<SessionState>,
    id: u64,
    armed: bool,
}

impl<S> Drop for StartingGuard<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        // A stop may already have taken this attempt and published `Stopped`
        if slot.pending.as_ref().is_some_and(|p| p.id == self.id) {
            slot.pending = None;
            self.state.send_replace(SessionState::Stopped);
        }
    }
}

/// Publishes `Stopped` once a shutdown finishes or is abandoned.
struct StoppingGuard<'a> {
    state: &'a watch::Sender<SessionState>,
}

impl Drop for StoppingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(SessionState::Stopped);
    }
}

/// Owns the single session of the process.
pub struct SessionController<R, L: SessionLauncher> {
    resolver: R,
    launcher: L,
    args: Vec<String>,
    workspace_root: Option<PathBuf>,
    /// Never held across an await.
    slot: Mutex<Slot<L::Session>>,
    state: watch::Sender<SessionState>,
}

impl<R, L: SessionLauncher> fmt::Debug for SessionController<R, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("args", &self.args)
            .field("workspace_root", &self.workspace_root)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<R: BinaryResolver, L: SessionLauncher> SessionController<R, L> {
    /// Creates a stopped controller.
    pub fn new(
        resolver: R,
        launcher: L,
        args: Vec<String>,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Stopped);
        Self {
            resolver,
            launcher,
            args,
            workspace_root,
            slot: Mutex::new(Slot {
                session: None,
                pending: None,
                attempts: 0,
            }),
            state,
        }
    }

    /// The binary resolver.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot<L::Session>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the session.
    ///
    /// ## Errors
    /// [`SessionError::AlreadyStarted`] at once if a session is starting or
    /// running; [`SessionError::Cancelled`] if [`SessionController::stop`]
    /// abandons this start; otherwise any provisioning or launch failure,
    /// after which the controller is stopped.
    pub async fn start(&self) -> Result<(), SessionError> {
        let (id, mut cancelled) = {
            let mut slot = self.lock_slot();
            if self.state() != SessionState::Stopped {
                return Err(SessionError::AlreadyStarted);
            }
            slot.attempts += 1;
            let (cancel, cancelled) = oneshot::channel();
            slot.pending = Some(PendingStart {
                id: slot.attempts,
                cancel,
            });
            self.state.send_replace(SessionState::Starting);
            (slot.attempts, cancelled)
        };
        let mut guard = StartingGuard {
            slot: &self.slot,
            state: &self.state,
            id,
            armed: true,
        };

        let session = tokio::select! {
            launched = self.resolve_and_launch() => launched?,
            _ = &mut cancelled => {
                info!("language server start cancelled");
                return Err(SessionError::Cancelled);
            }
        };

        let committed = {
            let mut slot = self.lock_slot();
            if slot.pending.as_ref().is_some_and(|p| p.id == id) {
                slot.pending = None;
                slot.session = Some(session);
                guard.armed = false;
                self.state.send_replace(SessionState::Running);
                None
            } else {
                Some(session)
            }
        };

        // Stopped while the launch was finishing
        if let Some(session) = committed {
            info!("language server start cancelled, shutting it down");
            if let Err(e) = session.shutdown().await {
                warn!(error = %e, "language server did not shut down cleanly");
            }
            return Err(SessionError::Cancelled);
        }

        info!("language server started");
        Ok(())
    }

    async fn resolve_and_launch(&self) -> Result<L::Session, SessionError> {
        let program = self.resolver.resolve().await?;
        let command = LaunchCommand::new(program, self.args.clone(), self.workspace_root.clone());
        info!(program = %command.program.display(), args = ?command.args, "starting language server");
        self.launcher.launch(&command).await
    }

    /// Stops the session.
    ///
    /// A start in progress is cancelled. Returns `true` if a session was
    /// starting or running and `false` if nothing was. Shutdown failures are
    /// logged; the session is released either way.
    pub async fn stop(&self) -> bool {
        let session = {
            let mut slot = self.lock_slot();
            if let Some(pending) = slot.pending.take() {
                drop(pending.cancel);
                self.state.send_replace(SessionState::Stopped);
                info!("cancelling language server start");
                return true;
            }
            let Some(session) = slot.session.take() else {
                return false;
            };
            session
        };

        // The state stays `Running` until the old server is gone
        let _stopping = StoppingGuard { state: &self.state };
        info!("stopping language server");
        if let Err(e) = session.shutdown().await {
            warn!(error = %e, "language server did not shut down cleanly");
        }
        true
    }

    /// Stops and then starts the session.
    ///
    /// If the start fails the controller stays stopped; the previous session
    /// is not restored.
    ///
    /// ## Errors
    /// The errors of [`SessionController::start`].
    pub async fn restart(&self) -> Result<(), SessionError> {
        self.stop().await;
        self.start().await
    }
}
