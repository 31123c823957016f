//! Zap Launcher
//!
//! Editor-side launcher for the Zap language server. It makes sure a
//! version-pinned server binary exists locally and supervises the single
//! client/server session talking to it.
//!
//! # Overview
//!
//! This library provides:
//! - Platform detection and release artifact naming
//! - Release lookup, atomic install and retention of installed versions
//! - A session controller with serialized start/stop/restart
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   start/stop   ┌───────────────────┐
//! │     Editor      │───────────────►│ SessionController │
//! └─────────────────┘                └─────────┬─────────┘
//!                               resolve        │        launch
//!                     ┌────────────────────────┴──────────────┐
//!              ┌──────▼──────┐                          ┌──────▼──────┐
//!              │ Provisioner │                          │ LspLauncher │
//!              └──────┬──────┘                          └──────┬──────┘
//!        PATH / GitHub releases / install root                 │ stdio (LSP)
//!                                                       ┌──────▼──────────────┐
//!                                                       │ zap-language-server │
//!                                                       └─────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`] - Launcher configuration
//! - [`context`] - Owned application context
//! - [`error`] - Error types for the entire crate
//! - [`provision`] - Binary provisioning
//! - [`session`] - Session lifecycle
//!
//! # Example
//!
//! ```ignore
//! use zap_launcher::{AppContext, LauncherConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LauncherConfig::builder().workspace_root(".").build()?;
//!     let context = AppContext::init(config)?;
//!
//!     context.controller().start().await?;
//!     // ...
//!     context.teardown().await;
//!
//!     Ok(())
//! }
//! ```

// Enforce documentation and other quality attributes
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are too strict
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod context;
pub mod error;
pub mod provision;
pub mod session;

// Re-export commonly used types at the crate root
pub use config::LauncherConfig;
pub use context::AppContext;
pub use error::{Error, Result};
