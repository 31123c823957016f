//! Language server session lifecycle.
//!
//! This module owns the single client/server session of the process.
//!
//! # Architecture
//!
//! The session module is organized into:
//! - `controller`: the start/stop/restart state machine and its seams
//! - `client`: the production launcher speaking LSP over stdio
//!
//! # Usage
//!
//! ```ignore
//! use zap_launcher::session::{LspLauncher, SessionController};
//!
//! let controller = SessionController::new(provisioner, launcher, vec!["serve".into()], None);
//! controller.start().await?;
//! controller.restart().await?;
//! assert!(controller.stop().await);
//! ```

pub mod client;
pub mod controller;

use crate::error::SessionError;

pub use client::{LspLauncher, LspSession};
pub use controller::{
    BinaryResolver, LaunchCommand, Session, SessionController, SessionLauncher, SessionState,
};

/// Result type for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
