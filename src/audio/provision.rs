//! Virtual device provisioning (Linux)
//!
//! Creates the virtual sink/microphone pair by running an external setup
//! script, then checks the audio server independently. The script's own
//! exit code is never trusted on its own: a "successful" run that left no
//! sink behind is reported as a failure, with hints on what to look at.

use super::devices::{DeviceInspector, DeviceStatus, SinkSpec, PACTL, SINK_ENV};
use super::probe::{ToolAvailability, ToolProber};
use super::process::{CommandRunner, Invocation};
use crate::platform::is_wsl;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Script that creates the virtual sink and microphone
pub const SETUP_SCRIPT: &str = "virtual_mic_setup.sh";

/// Script that removes them and restores the previous default source
pub const TEARDOWN_SCRIPT: &str = "virtual_mic_teardown.sh";

/// Set to `1` when the setup script should also loop the sink to the speakers
pub const MONITOR_TO_SPEAKERS_ENV: &str = "TTSMIC_MONITOR_TO_SPEAKERS";

/// Package managers in the order they are tried, with the matching hint
const INSTALL_HINTS: &[(&[&str], &str)] = &[
    (
        &["apt", "apt-get"],
        "sudo apt-get update && sudo apt-get install -y pulseaudio-utils pipewire-pulse",
    ),
    (&["dnf"], "sudo dnf install -y pulseaudio-utils pipewire-pulseaudio"),
    (&["pacman"], "sudo pacman -S --needed libpulse pipewire-pulse"),
    (&["zypper"], "sudo zypper install -y pulseaudio-utils pipewire-pulseaudio"),
];

const GENERIC_INSTALL_HINT: &str =
    "Install the packages providing 'pactl' (pulseaudio-utils) and 'pipewire-pulse' with your package manager";

/// Outcome of running one of the provisioning scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub success: bool,
    pub output: String,
}

/// Everything learned while setting up the virtual devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningReport {
    /// Setup script exited with status 0
    pub script_succeeded: bool,
    /// The virtual sink
    pub sink_status: DeviceStatus,
    /// Best of the two acceptable microphone sources
    pub source_status: DeviceStatus,
    /// `<sink>_mic` if present, else `<sink>.monitor` if present
    pub detected_source: Option<String>,
    /// Audio server default source after setup
    pub default_source: Option<String>,
    /// Script output followed by hints and the verification summary
    pub message: String,
}

impl ProvisioningReport {
    /// Script succeeded, sink exists and a usable microphone source exists
    pub fn success(&self) -> bool {
        self.script_succeeded && self.sink_status.is_present() && self.source_status.is_present()
    }

    fn not_attempted(message: String) -> Self {
        Self {
            script_succeeded: false,
            sink_status: DeviceStatus::Unknown,
            source_status: DeviceStatus::Unknown,
            detected_source: None,
            default_source: None,
            message,
        }
    }
}

/// Pick the install command for the first package manager found
pub fn install_hint(tools: &ToolAvailability<'_>) -> &'static str {
    INSTALL_HINTS
        .iter()
        .find(|(managers, _)| managers.iter().any(|m| tools.has(m)))
        .map(|(_, hint)| *hint)
        .unwrap_or(GENERIC_INSTALL_HINT)
}

/// Combine the two candidate microphone statuses
///
/// Either source being present is enough. Only when both were checked and
/// neither exists is the answer "absent".
fn combine_sources(mic: DeviceStatus, monitor: DeviceStatus) -> DeviceStatus {
    if mic.is_present() || monitor.is_present() {
        DeviceStatus::Present
    } else if mic.is_absent() && monitor.is_absent() {
        DeviceStatus::Absent
    } else {
        DeviceStatus::Unknown
    }
}

/// Runs the setup/teardown scripts and verifies the result
pub struct Provisioner {
    runner: Arc<dyn CommandRunner>,
    prober: Arc<dyn ToolProber>,
    inspector: DeviceInspector,
    scripts_dir: PathBuf,
    script_timeout: Duration,
}

impl Provisioner {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        prober: Arc<dyn ToolProber>,
        query_timeout: Duration,
        scripts_dir: PathBuf,
        script_timeout: Duration,
    ) -> Self {
        let inspector = DeviceInspector::new(runner.clone(), query_timeout);
        Self {
            runner,
            prober,
            inspector,
            scripts_dir,
            script_timeout,
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Create the virtual sink and microphone, then verify them
    pub fn setup(&self, sink: &SinkSpec, monitor_to_speakers: bool) -> ProvisioningReport {
        let tools = ToolAvailability::new(self.prober.as_ref());

        if !tools.has(PACTL) {
            let hint = install_hint(&tools);
            warn!("Setup aborted: {} not installed", PACTL);
            return ProvisioningReport::not_attempted(format!(
                "Linux setup requires '{}' (PulseAudio/pipewire-pulse client tools) to create a virtual sink and microphone.\n\
                 Install it, then retry setup. Suggested command:\n{}",
                PACTL, hint
            ));
        }

        if sink.name().is_empty() {
            return ProvisioningReport::not_attempted(
                "No sink name given. Set sink_name under [routing] in ~/.ttsmic.cfg or pass --sink NAME."
                    .to_string(),
            );
        }

        info!("Setting up virtual sink '{}'", sink.name());
        let mut env = vec![(SINK_ENV.to_string(), sink.name().to_string())];
        if monitor_to_speakers {
            env.push((MONITOR_TO_SPEAKERS_ENV.to_string(), "1".to_string()));
        }
        let script = self.run_script(SETUP_SCRIPT, &[sink.name()], env);

        let sink_status = self.inspector.sink_exists(&tools, sink.name());
        let mic_name = sink.mic_source_name();
        let monitor_name = sink.monitor_source_name();
        let mic = self.inspector.source_exists(&tools, &mic_name);
        let monitor = self.inspector.source_exists(&tools, &monitor_name);

        let detected_source = if mic.is_present() {
            Some(mic_name.clone())
        } else if monitor.is_present() {
            Some(monitor_name.clone())
        } else {
            None
        };
        let source_status = combine_sources(mic, monitor);
        let default_source = self
            .inspector
            .get_defaults(&tools)
            .and_then(|d| d.default_source);

        let verified = sink_status.is_present() && source_status.is_present();
        let mut lines = vec![script.output.clone()];

        if script.success && !verified {
            warn!(
                "Setup script succeeded but verification disagrees (sink {}, source {})",
                sink_status, source_status
            );
            if sink_status.is_absent() || source_status.is_absent() {
                lines.push(String::new());
                lines.push(
                    "The setup script reported success, but the virtual devices are not there, so setup FAILED."
                        .to_string(),
                );
            } else {
                lines.push(String::new());
                lines.push(
                    "The setup script reported success, but the result could not be verified because the pactl queries failed."
                        .to_string(),
                );
            }
            lines.extend(remediation_hints());
        } else if !script.success {
            lines.push(String::new());
            lines.push(format!(
                "Setup failed. Run `bash {} {}` in a terminal to see the full error, then check `pactl list short sinks`.",
                self.scripts_dir.join(SETUP_SCRIPT).display(),
                sink.name()
            ));
        }

        lines.push(String::new());
        lines.push("Verification:".to_string());
        lines.push(format!("  Sink '{}': {}", sink.name(), sink_status));
        match &detected_source {
            Some(source) => lines.push(format!("  Microphone source '{}': present", source)),
            None => lines.push(format!(
                "  Microphone source '{}' or '{}': {}",
                mic_name, monitor_name, source_status
            )),
        }
        lines.push(format!(
            "  Default source: {}",
            default_source.as_deref().unwrap_or("unknown")
        ));

        let report = ProvisioningReport {
            script_succeeded: script.success,
            sink_status,
            source_status,
            detected_source,
            default_source,
            message: lines.join("\n").trim_start().to_string(),
        };
        info!("Setup finished: success={}", report.success());
        report
    }

    /// Remove the virtual devices
    ///
    /// Best effort and idempotent; no verification pass.
    pub fn teardown(&self) -> ScriptOutcome {
        info!("Tearing down virtual devices");
        let mut outcome = self.run_script(TEARDOWN_SCRIPT, &[], Vec::new());
        if !outcome.success {
            outcome.output.push_str(
                "\n\nTeardown failed. List leftover modules with `pactl list short modules` and unload them with `pactl unload-module <id>`.",
            );
        }
        outcome
    }

    fn run_script(&self, name: &str, args: &[&str], env: Vec<(String, String)>) -> ScriptOutcome {
        let path = self.scripts_dir.join(name);
        if !path.is_file() {
            warn!("Script not found: {}", path.display());
            return ScriptOutcome {
                success: false,
                output: format!(
                    "Missing script: {}\nReinstall ttsmic or set scripts_dir under [routing] in ~/.ttsmic.cfg to the directory containing {}.",
                    path.display(),
                    name
                ),
            };
        }

        let mut invocation = Invocation::new("bash")
            .arg(path.to_string_lossy())
            .args(args.iter().copied());
        for (key, value) in env {
            invocation = invocation.env(key, value);
        }

        match self.runner.run(&invocation, Some(self.script_timeout)) {
            Ok(out) => {
                debug!("{} exited with {:?}", name, out.code);
                let output = out.combined();
                let output = if !output.is_empty() {
                    output
                } else if out.success {
                    "OK".to_string()
                } else {
                    format!("{} failed with exit code {:?}", name, out.code)
                };
                ScriptOutcome {
                    success: out.success,
                    output,
                }
            }
            Err(e) => {
                warn!("{} failed: {}", name, e);
                ScriptOutcome {
                    success: false,
                    output: format!("Failed to run {}: {}", path.display(), e),
                }
            }
        }
    }
}

/// Hints for when the script claims success but the devices are missing
fn remediation_hints() -> Vec<String> {
    let mut hints = vec![
        "Things to check:".to_string(),
        "  - Is the audio server running? Try `systemctl --user status pipewire-pulse` (or `pulseaudio --check -v`).".to_string(),
        "  - Sandboxed apps (Flatpak/Snap) may run against a different audio server and only see devices that existed at launch; restart the voice-chat app after setup.".to_string(),
        "  - Inspect devices with `pactl list short sinks` and `pactl list short sources`.".to_string(),
    ];
    if is_wsl() {
        hints.push(
            "  - Under WSL, PulseAudio is served by WSLg at /mnt/wslg/PulseServer; export PULSE_SERVER=unix:/mnt/wslg/PulseServer if pactl cannot connect."
                .to_string(),
        );
    }
    hints
}
