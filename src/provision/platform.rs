//! Host platform detection and the names derived from it.

use std::fmt;

use crate::error::PlatformError;

use super::release::ReleaseVersion;

/// Operating systems with published artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Microsoft Windows.
    Windows,
    /// Apple macOS.
    MacOs,
    /// Linux.
    Linux,
}

impl Os {
    /// Identifier used in artifact names.
    pub fn as_str(self) -> &'static str {
        match self {
            Os::Windows => "windows",
            Os::MacOs => "macos",
            Os::Linux => "linux",
        }
    }

    fn from_std(os: &str) -> Option<Self> {
        match os {
            "windows" => Some(Os::Windows),
            "macos" => Some(Os::MacOs),
            "linux" => Some(Os::Linux),
            _ => None,
        }
    }
}

/// CPU architectures with published artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 64-bit x86.
    X86_64,
    /// 64-bit ARM.
    Aarch64,
}

impl Arch {
    /// Identifier used in artifact names.
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }

    fn from_std(arch: &str) -> Option<Self> {
        match arch {
            "x86_64" => Some(Arch::X86_64),
            "aarch64" => Some(Arch::Aarch64),
            _ => None,
        }
    }
}

/// A recognized `(os, arch)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    os: Os,
    arch: Arch,
}

impl Platform {
    /// Creates a platform from explicit parts.
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detects the platform this process runs on.
    ///
    /// ## Errors
    /// Returns [`PlatformError::UnsupportedPlatform`] when either axis has no
    /// published artifact.
    pub fn current() -> Result<Self, PlatformError> {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Maps standard-library OS and architecture names to a platform.
    ///
    /// ## Errors
    /// Returns [`PlatformError::UnsupportedPlatform`] for unknown names.
    pub fn from_parts(os: &str, arch: &str) -> Result<Self, PlatformError> {
        match (Os::from_std(os), Arch::from_std(arch)) {
            (Some(os), Some(arch)) => Ok(Self { os, arch }),
            _ => Err(PlatformError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
        }
    }

    /// The operating system.
    pub fn os(self) -> Os {
        self.os
    }

    /// The architecture.
    pub fn arch(self) -> Arch {
        self.arch
    }

    /// Whether installed binaries need their execute bit set explicitly.
    pub fn is_unix_like(self) -> bool {
        matches!(self.os, Os::MacOs | Os::Linux)
    }

    /// File name of the binary on this platform.
    pub fn executable_file_name(self, binary: &str) -> String {
        match self.os {
            Os::Windows => format!("{binary}.exe"),
            Os::MacOs | Os::Linux => binary.to_string(),
        }
    }

    /// Name of the release artifact for `version`.
    pub fn release_asset_name(self, binary: &str, version: &ReleaseVersion) -> String {
        format!("{binary}-{version}-{}-{}.zip", self.os.as_str(), self.arch.as_str())
    }

    /// Name of the directory holding `version` under the install root.
    pub fn version_dir_name(binary: &str, version: &ReleaseVersion) -> String {
        format!("{binary}-{version}")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}
