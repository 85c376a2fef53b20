//! Audio routing: tool probing, device inspection, provisioning and playback

pub mod devices;
pub mod playback;
pub mod probe;
pub mod process;
pub mod provision;

pub use devices::{DeviceDefaults, DeviceInspector, DeviceStatus, SinkSpec};
pub use playback::{PlaybackCandidate, PlaybackDispatcher, PlaybackOutcome, Targeting};
pub use probe::{SystemProber, ToolAvailability, ToolProber};
pub use process::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use provision::{ProvisioningReport, Provisioner, ScriptOutcome};
