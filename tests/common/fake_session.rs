//! Session doubles recording what the controller asks of them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zap_launcher::error::{ProvisionError, SessionError};
use zap_launcher::session::{BinaryResolver, LaunchCommand, Session, SessionLauncher};

/// Resolver returning a fixed path, or failing on demand.
#[derive(Debug)]
pub struct FakeResolver {
    path: PathBuf,
    fail: AtomicBool,
    resolves: AtomicUsize,
    delay: Duration,
}

impl FakeResolver {
    /// Resolves to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fail: AtomicBool::new(false),
            resolves: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Makes every resolution take `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes subsequent resolutions fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of resolutions requested.
    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

impl BinaryResolver for FakeResolver {
    async fn resolve(&self) -> Result<PathBuf, ProvisionError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProvisionError::ServerPathMissing(self.path.clone()));
        }
        Ok(self.path.clone())
    }
}

/// A launched fake session.
#[derive(Debug)]
pub struct FakeSession {
    /// Sequence number of the launch that produced this session.
    pub id: usize,
    shutdowns: Arc<Mutex<Vec<usize>>>,
}

impl Session for FakeSession {
    async fn shutdown(self) -> Result<(), SessionError> {
        self.shutdowns.lock().unwrap().push(self.id);
        Ok(())
    }
}

/// Launcher recording every launch and shutdown.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    launches: Arc<Mutex<Vec<LaunchCommand>>>,
    shutdowns: Arc<Mutex<Vec<usize>>>,
    fail_next: Arc<AtomicBool>,
}

impl FakeLauncher {
    /// Creates a launcher that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next launch fail.
    pub fn fail_next_launch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Every command launched so far.
    /// ## Panics
    pub fn launches(&self) -> Vec<LaunchCommand> {
        self.launches.lock().unwrap().clone()
    }

    /// Ids of the sessions shut down so far, in order.
    /// ## Panics
    pub fn shutdowns(&self) -> Vec<usize> {
        self.shutdowns.lock().unwrap().clone()
    }
}

impl SessionLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self, command: &LaunchCommand) -> Result<FakeSession, SessionError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SessionError::SessionLaunchFailed(format!(
                "failed to spawn '{}': permission denied",
                command.program.display()
            )));
        }
        let mut launches = self.launches.lock().unwrap();
        launches.push(command.clone());
        Ok(FakeSession {
            id: launches.len(),
            shutdowns: Arc::clone(&self.shutdowns),
        })
    }
}
