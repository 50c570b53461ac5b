//! Mapping of the running operating system to a release artifact.
//!
//! Every release publishes one self-contained executable per platform. The
//! artifact names form a closed set:
//!
//! | OS            | x86_64              | aarch64                   |
//! |---------------|---------------------|---------------------------|
//! | Linux (glibc) | `engine-linux`      | `engine-linux-arm64`      |
//! | Linux (musl)  | `engine-alpine`     | `engine-alpine-arm64`     |
//! | macOS         | `engine-macos`      | `engine-macos-arm64`      |
//! | Windows       | `engine-win.exe`    | `engine-win.exe`          |
//!
//! Musl is detected through the Alpine marker file
//! ([`ALPINE_MARKER_FILE`](crate::constants::ALPINE_MARKER_FILE)).

use crate::constants::ALPINE_MARKER_FILE;
use crate::core::UpdateError;
use std::fmt;
use std::path::Path;

/// File stem shared by every published artifact.
pub const ARTIFACT_STEM: &str = "engine";

/// Operating system family an artifact is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    /// glibc-based Linux
    Linux,
    /// musl-based Linux (Alpine)
    LinuxMusl,
    /// macOS
    MacOs,
    /// Windows
    Windows,
}

impl PlatformKind {
    /// Suffix used in the artifact file name.
    pub const fn artifact_suffix(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::LinuxMusl => "alpine",
            Self::MacOs => "macos",
            Self::Windows => "win.exe",
        }
    }
}

/// Resolved release target of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformTarget {
    kind: PlatformKind,
    arm64: bool,
}

impl PlatformTarget {
    /// Resolve the x86_64 target for `os_name`.
    ///
    /// Matching is case-insensitive:
    /// - `linux` maps to [`PlatformKind::Linux`], or [`PlatformKind::LinuxMusl`]
    ///   when `has_alpine_marker` is set
    /// - `mac os x`, `darwin`, `osx` and `macos` map to [`PlatformKind::MacOs`]
    /// - anything containing `windows` maps to [`PlatformKind::Windows`]
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::UnsupportedPlatform`] for any other name.
    pub fn resolve(os_name: &str, has_alpine_marker: bool) -> Result<Self, UpdateError> {
        Self::resolve_for_arch(os_name, "x86_64", has_alpine_marker)
    }

    /// Resolve the target for `os_name` on CPU architecture `arch`.
    ///
    /// `aarch64` and `arm64` select the ARM builds on Linux and macOS. Windows
    /// ships a single artifact.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::UnsupportedPlatform`] for an unknown OS name.
    pub fn resolve_for_arch(
        os_name: &str,
        arch: &str,
        has_alpine_marker: bool,
    ) -> Result<Self, UpdateError> {
        let os = os_name.trim().to_lowercase();
        let arch = arch.trim().to_lowercase();
        let is_arm64 = arch == "aarch64" || arch == "arm64";

        let kind = match os.as_str() {
            "linux" if has_alpine_marker => PlatformKind::LinuxMusl,
            "linux" => PlatformKind::Linux,
            "mac os x" | "darwin" | "osx" | "macos" => PlatformKind::MacOs,
            _ if os.contains("windows") => PlatformKind::Windows,
            _ => {
                return Err(UpdateError::UnsupportedPlatform {
                    os: os_name.to_string(),
                });
            }
        };

        Ok(Self {
            kind,
            arm64: is_arm64 && kind != PlatformKind::Windows,
        })
    }

    /// Resolve the target of the running process.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::UnsupportedPlatform`] when compiled for an OS
    /// without published artifacts.
    pub fn current() -> Result<Self, UpdateError> {
        let alpine = Path::new(ALPINE_MARKER_FILE).exists();
        Self::resolve_for_arch(std::env::consts::OS, std::env::consts::ARCH, alpine)
    }

    /// Operating system family.
    pub const fn kind(&self) -> PlatformKind {
        self.kind
    }

    /// Whether the ARM64 build is selected.
    pub const fn is_arm64(&self) -> bool {
        self.arm64
    }

    /// Artifact suffix, e.g. `alpine-arm64`.
    pub fn artifact_suffix(&self) -> String {
        if self.arm64 {
            format!("{}-arm64", self.kind.artifact_suffix())
        } else {
            self.kind.artifact_suffix().to_string()
        }
    }

    /// Full artifact file name, e.g. `engine-linux`.
    pub fn artifact_name(&self) -> String {
        format!("{ARTIFACT_STEM}-{}", self.artifact_suffix())
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.artifact_name())
    }
}
