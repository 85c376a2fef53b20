//! Playback dispatch into the virtual sink
//!
//! Picks the best installed player for the target device and launches it
//! detached. Players are ranked by how reliably they hit the named device,
//! not by how likely they are to be installed.

use super::devices::{DeviceInspector, DeviceStatus};
use super::probe::{ToolAvailability, ToolProber};
use super::process::{CommandRunner, Invocation};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How well a player honours the requested device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Targeting {
    /// Takes the device name as an argument
    Exact,
    /// Steered through `PULSE_SINK`; may be ignored
    EnvironmentHint,
    /// Always plays to the system default device
    DefaultDevice,
}

struct PlaybackBackend {
    tool: &'static str,
    targeting: Targeting,
    build: fn(&str, &str) -> Invocation,
}

/// Players in priority order; the first installed one wins
static BACKENDS: &[PlaybackBackend] = &[
    PlaybackBackend {
        tool: "paplay",
        targeting: Targeting::Exact,
        build: |device, file| Invocation::new("paplay").args(["--device", device, file]),
    },
    PlaybackBackend {
        tool: "pw-play",
        targeting: Targeting::Exact,
        build: |device, file| Invocation::new("pw-play").args(["--target", device, file]),
    },
    PlaybackBackend {
        tool: "ffplay",
        targeting: Targeting::EnvironmentHint,
        build: |device, file| {
            Invocation::new("ffplay")
                .args(["-nodisp", "-autoexit", "-loglevel", "error", file])
                .env("PULSE_SINK", device)
        },
    },
    PlaybackBackend {
        tool: "aplay",
        targeting: Targeting::DefaultDevice,
        build: |_device, file| Invocation::new("aplay").arg(file),
    },
];

/// Names of every supported player, in priority order
pub fn backend_names() -> Vec<&'static str> {
    BACKENDS.iter().map(|b| b.tool).collect()
}

/// A player that is installed and ready to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackCandidate {
    pub backend: &'static str,
    pub targeting: Targeting,
    pub invocation: Invocation,
}

/// Installed players for `device` and `file`, best first
pub fn candidates(tools: &ToolAvailability<'_>, device: &str, file: &Path) -> Vec<PlaybackCandidate> {
    let file = file.to_string_lossy();
    BACKENDS
        .iter()
        .filter(|backend| tools.has(backend.tool))
        .map(|backend| PlaybackCandidate {
            backend: backend.tool,
            targeting: backend.targeting,
            invocation: (backend.build)(device, &file),
        })
        .collect()
}

/// What happened to a playback request
///
/// `started` means a player was launched, not that anything was heard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackOutcome {
    pub started: bool,
    pub backend: Option<String>,
    pub device: Option<String>,
    pub error: Option<String>,
}

impl PlaybackOutcome {
    fn failed(error: String) -> Self {
        warn!("Playback not started: {}", error);
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Plays audio files into a named sink
pub struct PlaybackDispatcher {
    runner: Arc<dyn CommandRunner>,
    prober: Arc<dyn ToolProber>,
    inspector: DeviceInspector,
}

impl PlaybackDispatcher {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        prober: Arc<dyn ToolProber>,
        query_timeout: Duration,
    ) -> Self {
        let inspector = DeviceInspector::new(runner.clone(), query_timeout);
        Self {
            runner,
            prober,
            inspector,
        }
    }

    /// Launch `file` on `device` and return without waiting
    pub fn play(&self, file: &Path, device: &str) -> PlaybackOutcome {
        let device = device.trim();
        if device.is_empty() {
            return PlaybackOutcome::failed(
                "No sink name given. Set sink_name under [routing] in ~/.ttsmic.cfg or pass --sink NAME."
                    .to_string(),
            );
        }

        let tools = ToolAvailability::new(self.prober.as_ref());

        match self.inspector.sink_exists(&tools, device) {
            DeviceStatus::Absent => {
                return PlaybackOutcome::failed(format!(
                    "Sink not found: {}. Run `ttsmic setup` to create it, or create it manually with \
                     `pactl load-module module-null-sink sink_name={}`.",
                    device, device
                ));
            }
            DeviceStatus::Unknown => debug!("Could not verify sink '{}', trying anyway", device),
            DeviceStatus::Present => {}
        }

        if !file.is_file() {
            return PlaybackOutcome::failed(format!(
                "Audio file not found: {}. Check the path or synthesize again with `ttsmic speak`.",
                file.display()
            ));
        }

        let Some(chosen) = candidates(&tools, device, file).into_iter().next() else {
            return PlaybackOutcome::failed(format!(
                "No audio player found (need {}). Install one, e.g. `sudo apt-get install pulseaudio-utils` for paplay.",
                join_names(&backend_names())
            ));
        };

        match chosen.targeting {
            Targeting::Exact => {}
            Targeting::EnvironmentHint => warn!(
                "{} is steered via PULSE_SINK and may not play into '{}'",
                chosen.backend, device
            ),
            Targeting::DefaultDevice => warn!(
                "{} plays to the default device, not '{}'",
                chosen.backend, device
            ),
        }

        info!("Playing {} on '{}' with {}", file.display(), device, chosen.backend);
        self.runner.spawn_detached(chosen.invocation);

        PlaybackOutcome {
            started: true,
            backend: Some(chosen.backend.to_string()),
            device: Some(device.to_string()),
            error: None,
        }
    }
}

/// "a, b, c, or d"
fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{}, or {}", init.join(", "), last),
    }
}
