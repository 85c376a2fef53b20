//! Error types for ttsmic

use std::io;
use thiserror::Error;

/// Main error type for ttsmic
///
/// Provisioning and playback report their outcomes as structured values;
/// this type covers the plumbing underneath them (config, processes, HTTP).
#[derive(Error, Debug)]
pub enum TtsMicError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Process error: {0}")]
    Process(String),

    #[error("'{program}' did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unsupported OS mode: {0} (use auto, linux, windows or macos)")]
    UnsupportedPlatform(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for ttsmic operations
pub type Result<T> = std::result::Result<T, TtsMicError>;

impl From<String> for TtsMicError {
    fn from(s: String) -> Self {
        TtsMicError::Other(s)
    }
}

impl From<&str> for TtsMicError {
    fn from(s: &str) -> Self {
        TtsMicError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for TtsMicError {
    fn from(e: serde_json::Error) -> Self {
        TtsMicError::Http(format!("JSON error: {}", e))
    }
}
