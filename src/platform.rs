//! Platform detection and OS mode resolution

use crate::{Result, TtsMicError};
use std::fmt;
use std::fs;
use std::str::FromStr;

/// Which platform strategy to use for setup, teardown and playback
///
/// Resolved once per session. Mixing modes between setup and playback is
/// a caller error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsMode {
    /// PulseAudio / PipeWire: virtual devices are scripted
    Linux,
    /// Requires a third-party virtual cable driver
    Windows,
    /// Requires a third-party loopback driver
    MacOS,
}

impl OsMode {
    /// Map a runtime platform name (as in `std::env::consts::OS`) to a mode
    ///
    /// Anything that is not Windows or macOS is treated as Linux.
    pub fn from_runtime(runtime_os: &str) -> Self {
        match runtime_os {
            "windows" => OsMode::Windows,
            "macos" => OsMode::MacOS,
            _ => OsMode::Linux,
        }
    }

    /// Mode of the platform this binary is running on
    pub fn current() -> Self {
        Self::from_runtime(std::env::consts::OS)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsMode::Linux => "linux",
            OsMode::Windows => "windows",
            OsMode::MacOS => "macos",
        }
    }
}

impl fmt::Display for OsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsMode {
    type Err = TtsMicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "linux" => Ok(OsMode::Linux),
            "windows" | "win32" => Ok(OsMode::Windows),
            "macos" | "mac" | "darwin" => Ok(OsMode::MacOS),
            other => Err(TtsMicError::UnsupportedPlatform(other.to_string())),
        }
    }
}

/// Resolve a requested mode against the runtime platform
///
/// `"auto"` (or an empty request) follows the runtime platform. Explicit
/// values win even when they disagree with the runtime, so a Linux user can
/// ask for the Windows instructions.
pub fn resolve_mode(requested: &str, runtime_os: &str) -> Result<OsMode> {
    let requested = requested.trim();
    if requested.is_empty() || requested.eq_ignore_ascii_case("auto") {
        return Ok(OsMode::from_runtime(runtime_os));
    }
    requested.parse()
}

/// Detect if running in WSL (Windows Subsystem for Linux)
///
/// Checks for WSL-specific indicators in /proc/version and environment variables.
pub fn is_wsl() -> bool {
    if let Ok(contents) = fs::read_to_string("/proc/version") {
        let lower = contents.to_lowercase();
        if lower.contains("microsoft") || lower.contains("wsl") {
            return true;
        }
    }

    std::env::var("WSL_DISTRO_NAME").is_ok()
}
