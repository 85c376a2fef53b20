//! ttsmic - text-to-speech into a voice-chat microphone
//!
//! Sends text to a TTS server and routes the synthesized audio into a
//! virtual microphone: a PulseAudio/PipeWire virtual sink on Linux, or a
//! third-party virtual cable on Windows and macOS.

pub mod audio;
pub mod client;
pub mod error;
pub mod platform;
pub mod router;
pub mod state;

pub use error::{Result, TtsMicError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "ttsmic";
