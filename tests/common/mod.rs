//! Common test helpers and utilities.

#![allow(dead_code)]

pub mod fake_release;
pub mod fake_session;

use std::io::{Cursor, Write};
use std::path::Path;
use std::time::Duration;

use zap_launcher::LauncherConfig;
use zip::write::SimpleFileOptions;

// Re-export for convenience
pub use fake_release::FakeReleaseClient;
pub use fake_session::{FakeLauncher, FakeResolver};

/// Binary name used by the fixtures; chosen so it is never found on PATH.
pub const BINARY: &str = "zap-fixture-server";

/// Builds an in-memory zip archive from `(name, contents)` pairs.
/// ## Panics
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("failed to start zip entry");
        writer.write_all(contents).expect("failed to write zip entry");
    }
    writer.finish().expect("failed to finish zip").into_inner()
}

/// Launcher configuration rooted at `install_root`.
/// ## Panics
pub fn test_config(install_root: &Path) -> LauncherConfig {
    LauncherConfig::builder()
        .binary_name(BINARY)
        .repository("zap-fixtures/zap-fixture-server")
        .install_root(install_root)
        .skip_path_lookup(true)
        .network_timeout(Duration::from_secs(10))
        .build()
        .expect("test configuration should be valid")
}
