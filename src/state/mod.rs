//! Session state
//!
//! A [`Session`] pairs the loaded configuration with the OS mode resolved
//! for it. The mode is resolved exactly once, so setup, teardown and
//! playback within a session always agree on the platform strategy.

pub mod config;

use crate::audio::devices::PACTL;
use crate::audio::{
    playback, CommandRunner, DeviceDefaults, DeviceInspector, DeviceStatus, PlaybackDispatcher,
    Provisioner, SinkSpec, SystemProber, SystemRunner, ToolAvailability, ToolProber,
};
use crate::platform::{resolve_mode, OsMode};
use crate::router::{PlaybackRoute, PlatformRouter, RouteResponse};
use crate::Result;
use config::Config;
use log::info;
use std::path::Path;
use std::sync::Arc;

/// Per-invocation overrides (command-line flags)
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Replaces `[routing] os`
    pub os: Option<String>,
    /// Replaces `[routing] sink_name`
    pub sink: Option<String>,
}

/// Snapshot of what the audio subsystem can see right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStatus {
    pub mode: OsMode,
    pub sink_name: String,
    /// Every tool probed, sorted by name
    pub tools: Vec<(String, bool)>,
    pub sink: DeviceStatus,
    pub mic_source: DeviceStatus,
    pub monitor_source: DeviceStatus,
    pub defaults: Option<DeviceDefaults>,
}

/// Configuration plus the platform strategy resolved from it
pub struct Session {
    pub config: Config,
    router: PlatformRouter,
    prober: Arc<dyn ToolProber>,
    inspector: DeviceInspector,
}

impl Session {
    /// Session against the real system and the running platform
    pub fn new(config: Config, options: &SessionOptions) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let prober: Arc<dyn ToolProber> =
            Arc::new(SystemProber::new(runner.clone(), config.query_timeout()));
        Self::with_parts(config, options, std::env::consts::OS, runner, prober)
    }

    /// Session with explicit runtime platform, runner and prober
    pub fn with_parts(
        config: Config,
        options: &SessionOptions,
        runtime_os: &str,
        runner: Arc<dyn CommandRunner>,
        prober: Arc<dyn ToolProber>,
    ) -> Result<Self> {
        let requested = options.os.clone().unwrap_or_else(|| config.os_mode());
        let mode = resolve_mode(&requested, runtime_os)?;
        let sink = SinkSpec::new(options.sink.clone().unwrap_or_else(|| config.sink_name()));
        info!("Session: mode {} (requested '{}'), sink '{}'", mode, requested, sink.name());

        let query_timeout = config.query_timeout();
        let provisioner = Provisioner::new(
            runner.clone(),
            prober.clone(),
            query_timeout,
            config.scripts_dir(),
            config.script_timeout(),
        );
        let dispatcher = PlaybackDispatcher::new(runner.clone(), prober.clone(), query_timeout);
        let router = PlatformRouter::new(mode, provisioner, dispatcher, sink, config.device_hint());
        let inspector = DeviceInspector::new(runner, query_timeout);

        Ok(Self {
            config,
            router,
            prober,
            inspector,
        })
    }

    pub fn mode(&self) -> OsMode {
        self.router.mode()
    }

    pub fn sink(&self) -> &SinkSpec {
        self.router.sink()
    }

    /// Set up the virtual microphone for this session's platform
    pub fn setup(&self, monitor_to_speakers: bool) -> RouteResponse {
        self.router.setup(monitor_to_speakers)
    }

    pub fn teardown(&self) -> RouteResponse {
        self.router.teardown()
    }

    /// Route an audio file to the virtual microphone
    pub fn playback(&self, file: &Path) -> PlaybackRoute {
        self.router.playback(file)
    }

    /// Probe tools and devices for a status display
    pub fn status(&self) -> AudioStatus {
        let tools = ToolAvailability::new(self.prober.as_ref());
        let sink = self.sink();

        for name in [PACTL, "bash"].into_iter().chain(playback::backend_names()) {
            tools.has(name);
        }

        AudioStatus {
            mode: self.mode(),
            sink_name: sink.name().to_string(),
            sink: self.inspector.sink_exists(&tools, sink.name()),
            mic_source: self.inspector.source_exists(&tools, &sink.mic_source_name()),
            monitor_source: self
                .inspector
                .source_exists(&tools, &sink.monitor_source_name()),
            defaults: self.inspector.get_defaults(&tools),
            tools: tools.probed(),
        }
    }
}
