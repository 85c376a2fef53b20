//! Platform routing for setup, teardown and playback
//!
//! Linux can create virtual devices itself, so it gets the scripted
//! provisioner and the external playback dispatcher. Windows and macOS
//! need a third-party virtual driver: setup turns into instructions, and
//! playback happens inside this process so that the user's per-app output
//! routing sends it to the driver.

use crate::audio::{PlaybackDispatcher, PlaybackOutcome, ProvisioningReport, Provisioner, SinkSpec};
use crate::platform::OsMode;
use log::{debug, info};
use std::path::Path;

/// Virtual cable product users install on Windows
pub const WINDOWS_DRIVER: &str = "VB-Audio Virtual Cable (VB-Cable)";

/// Loopback driver users install on macOS
pub const MACOS_DRIVER: &str = "BlackHole";

/// Reply to a setup or teardown request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResponse {
    pub success: bool,
    /// The user has to finish the job by hand (install a driver, pick devices)
    pub requires_user_action: bool,
    pub output: String,
    /// Full verification details when Linux provisioning ran
    pub report: Option<ProvisioningReport>,
}

/// Where post-synthesis audio should be played
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackRoute {
    /// Play inside this process; the OS routes it to the virtual driver
    InApp { note: String },
    /// Handed to an external player aimed at the virtual sink
    Dispatched(PlaybackOutcome),
}

impl PlaybackRoute {
    /// Playback is underway (or, in-app, up to the caller to start)
    pub fn started(&self) -> bool {
        match self {
            PlaybackRoute::InApp { .. } => true,
            PlaybackRoute::Dispatched(outcome) => outcome.started,
        }
    }
}

/// Default device-name hint for the mode's virtual driver
pub fn default_device_hint(mode: OsMode) -> &'static str {
    match mode {
        OsMode::Windows => "CABLE",
        OsMode::MacOS => "BlackHole",
        OsMode::Linux => "",
    }
}

/// Dispatches requests to the strategy for one resolved [`OsMode`]
pub struct PlatformRouter {
    mode: OsMode,
    provisioner: Provisioner,
    dispatcher: PlaybackDispatcher,
    sink: SinkSpec,
    device_hint: String,
}

impl PlatformRouter {
    pub fn new(
        mode: OsMode,
        provisioner: Provisioner,
        dispatcher: PlaybackDispatcher,
        sink: SinkSpec,
        device_hint: Option<String>,
    ) -> Self {
        let device_hint = device_hint
            .map(|h| h.trim().to_string())
            .unwrap_or_else(|| default_device_hint(mode).to_string());
        Self {
            mode,
            provisioner,
            dispatcher,
            sink,
            device_hint,
        }
    }

    pub fn mode(&self) -> OsMode {
        self.mode
    }

    pub fn sink(&self) -> &SinkSpec {
        &self.sink
    }

    pub fn setup(&self, monitor_to_speakers: bool) -> RouteResponse {
        info!("Audio setup for {}", self.mode);
        match self.mode {
            OsMode::Linux => {
                let report = self.provisioner.setup(&self.sink, monitor_to_speakers);
                RouteResponse {
                    success: report.success(),
                    requires_user_action: false,
                    output: report.message.clone(),
                    report: Some(report),
                }
            }
            OsMode::Windows => manual(windows_instructions(&self.device_hint)),
            OsMode::MacOS => manual(macos_instructions(&self.device_hint)),
        }
    }

    pub fn teardown(&self) -> RouteResponse {
        match self.mode {
            OsMode::Linux => {
                let outcome = self.provisioner.teardown();
                RouteResponse {
                    success: outcome.success,
                    requires_user_action: false,
                    output: outcome.output,
                    report: None,
                }
            }
            OsMode::Windows | OsMode::MacOS => {
                debug!("Teardown is a no-op on {}", self.mode);
                RouteResponse {
                    success: true,
                    requires_user_action: false,
                    output: "Nothing to restore on this OS (virtual sink teardown is Linux-only)."
                        .to_string(),
                    report: None,
                }
            }
        }
    }

    /// Route freshly synthesized audio towards the voice-chat microphone
    pub fn playback(&self, file: &Path) -> PlaybackRoute {
        match self.mode {
            OsMode::Linux => PlaybackRoute::Dispatched(self.dispatcher.play(file, self.sink.name())),
            OsMode::Windows | OsMode::MacOS => PlaybackRoute::InApp {
                note: format!(
                    "Play in-app. Route this app's output to your virtual device{} in the OS sound settings.",
                    if self.device_hint.is_empty() {
                        String::new()
                    } else {
                        format!(" ('{}')", self.device_hint)
                    }
                ),
            },
        }
    }
}

fn manual(output: String) -> RouteResponse {
    RouteResponse {
        success: true,
        requires_user_action: true,
        output,
        report: None,
    }
}

fn windows_instructions(hint: &str) -> String {
    let mut lines = vec![
        "Windows cannot create a new audio sink without a virtual audio driver.".to_string(),
        format!("Install {}, then:", WINDOWS_DRIVER),
        "- In your voice-chat app, set Input Device = 'CABLE Output' (or leave it on Default and make CABLE Output the Windows default input)".to_string(),
        "- Send this app's audio to 'CABLE Input' (Settings > System > Sound > Volume mixer, per-app output)".to_string(),
        "- Then turn on auto_play under [routing] in ~/.ttsmic.cfg".to_string(),
    ];
    if !hint.is_empty() {
        lines.push(format!(
            "Tip: look for devices containing '{}' in Windows Sound settings.",
            hint
        ));
    }
    lines.join("\n")
}

fn macos_instructions(hint: &str) -> String {
    let mut lines = vec![
        "macOS needs a virtual audio driver to create a device your voice-chat app can use.".to_string(),
        format!(
            "Install {}, then set your voice-chat app's Input Device to it and route this app's output to it (Audio MIDI Setup can build a Multi-Output Device if you also want to hear it).",
            MACOS_DRIVER
        ),
        "(The OS provides no automation for creating the device.)".to_string(),
    ];
    if !hint.is_empty() {
        lines.push(format!(
            "Tip: the device shows up with '{}' in its name.",
            hint
        ));
    }
    lines.join("\n")
}
