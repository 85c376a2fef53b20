//! Audio server device inspection
//!
//! Asks the PulseAudio / PipeWire server (through `pactl`) which sinks and
//! sources exist. Answers are tri-state: when `pactl` is missing or fails,
//! the honest answer is "unknown", not "absent".

use super::probe::ToolAvailability;
use super::process::{CommandRunner, Invocation};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Audio server introspection tool
pub const PACTL: &str = "pactl";

/// Sink name used when none is configured
pub const DEFAULT_SINK_NAME: &str = "ttsmic_sink";

/// Environment variable that names the sink (also read by the setup script)
pub const SINK_ENV: &str = "TTSMIC_SINK";

static DEFAULT_DEVICE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*Default (Sink|Source):\s*(\S+)\s*$")
        .expect("default device pattern is valid")
});

/// Result of asking whether a device exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// The audio server lists the device
    Present,
    /// The audio server was asked and does not list it
    Absent,
    /// The question could not be asked (tool missing, query failed)
    Unknown,
}

impl DeviceStatus {
    pub fn is_present(self) -> bool {
        self == DeviceStatus::Present
    }

    pub fn is_absent(self) -> bool {
        self == DeviceStatus::Absent
    }

    fn from_listing(found: bool) -> Self {
        if found {
            DeviceStatus::Present
        } else {
            DeviceStatus::Absent
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceStatus::Present => "present",
            DeviceStatus::Absent => "missing",
            DeviceStatus::Unknown => "unknown (could not check)",
        })
    }
}

/// A virtual sink and the sources derived from it
///
/// Both the remapped `<name>_mic` source and the `<name>.monitor` source
/// can serve as the voice-chat microphone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    name: String,
}

impl SinkSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mic_source_name(&self) -> String {
        format!("{}_mic", self.name)
    }

    pub fn monitor_source_name(&self) -> String {
        format!("{}.monitor", self.name)
    }
}

/// Default sink and source as reported by the audio server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDefaults {
    pub default_sink: Option<String>,
    pub default_source: Option<String>,
}

/// Queries the audio server for sinks, sources and defaults
pub struct DeviceInspector {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl DeviceInspector {
    /// `timeout` bounds every `pactl` call so a wedged audio server cannot
    /// hang verification.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    pub fn sink_exists(&self, tools: &ToolAvailability<'_>, name: &str) -> DeviceStatus {
        self.exists(tools, "sinks", name)
    }

    pub fn source_exists(&self, tools: &ToolAvailability<'_>, name: &str) -> DeviceStatus {
        self.exists(tools, "sources", name)
    }

    /// Default sink/source names, or `None` if the server could not be asked
    pub fn get_defaults(&self, tools: &ToolAvailability<'_>) -> Option<DeviceDefaults> {
        if !tools.has(PACTL) {
            return None;
        }
        self.query(Invocation::new(PACTL).arg("info"))
            .map(|info| parse_defaults(&info))
    }

    fn exists(&self, tools: &ToolAvailability<'_>, kind: &str, name: &str) -> DeviceStatus {
        let name = name.trim();
        if name.is_empty() {
            return DeviceStatus::Absent;
        }
        if !tools.has(PACTL) {
            return DeviceStatus::Unknown;
        }

        let status = match self.query(Invocation::new(PACTL).args(["list", "short", kind])) {
            Some(listing) => DeviceStatus::from_listing(listing_contains(&listing, name)),
            None => DeviceStatus::Unknown,
        };
        debug!("{} '{}': {}", kind, name, status);
        status
    }

    /// Stdout of a successful query, `None` on any failure
    fn query(&self, invocation: Invocation) -> Option<String> {
        // Untranslated output: "Default Sink:" must stay in English
        let invocation = invocation.env("LC_ALL", "C");
        match self.runner.run(&invocation, Some(self.timeout)) {
            Ok(out) if out.success => Some(out.stdout),
            Ok(out) => {
                warn!(
                    "{} failed ({:?}): {}",
                    invocation.command_line(),
                    out.code,
                    out.stderr.trim()
                );
                None
            }
            Err(e) => {
                warn!("{} failed: {}", invocation.command_line(), e);
                None
            }
        }
    }
}

/// Whether a `pactl list short` listing names `name` in its second column
pub fn listing_contains(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

/// Extract `Default Sink:` / `Default Source:` from `pactl info` output
pub fn parse_defaults(info: &str) -> DeviceDefaults {
    let mut defaults = DeviceDefaults::default();
    for caps in DEFAULT_DEVICE_LINE.captures_iter(info) {
        let value = Some(caps[2].to_string());
        match &caps[1] {
            "Sink" => defaults.default_sink = value,
            _ => defaults.default_source = value,
        }
    }
    defaults
}
