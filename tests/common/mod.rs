//! Shared fakes for integration tests
//!
//! `FakeRunner` answers canned output per command line and records every
//! run and detached launch; `FakeProber` reports a fixed set of installed
//! tools and records every probe.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use ttsmic::audio::provision::{SETUP_SCRIPT, TEARDOWN_SCRIPT};
use ttsmic::audio::{CommandOutput, CommandRunner, Invocation, ToolProber};
use ttsmic::state::config::Config;
use ttsmic::{Result, TtsMicError};

pub const TIMEOUT: Duration = Duration::from_secs(5);

enum Reply {
    Output(CommandOutput),
    Error(String),
}

#[derive(Default)]
pub struct FakeRunner {
    by_command_line: Mutex<HashMap<String, CommandOutput>>,
    by_program: Mutex<HashMap<String, CommandOutput>>,
    errors: Mutex<HashMap<String, String>>,
    runs: Mutex<Vec<Invocation>>,
    spawned: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reply for an exact command line (`program arg arg ...`)
    pub fn respond(&self, command_line: &str, output: CommandOutput) {
        self.by_command_line
            .lock()
            .unwrap()
            .insert(command_line.to_string(), output);
    }

    /// Reply for any invocation of `program` without an exact match
    pub fn respond_program(&self, program: &str, output: CommandOutput) {
        self.by_program
            .lock()
            .unwrap()
            .insert(program.to_string(), output);
    }

    /// Make an exact command line fail to run (spawn error / timeout)
    pub fn error(&self, command_line: &str, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .insert(command_line.to_string(), message.to_string());
    }

    /// Canned `pactl list short` listings
    pub fn devices(&self, sinks: &[&str], sources: &[&str]) {
        self.respond("pactl list short sinks", CommandOutput::ok(listing(sinks)));
        self.respond("pactl list short sources", CommandOutput::ok(listing(sources)));
    }

    pub fn runs(&self) -> Vec<Invocation> {
        self.runs.lock().unwrap().clone()
    }

    pub fn spawned(&self) -> Vec<Invocation> {
        self.spawned.lock().unwrap().clone()
    }

    /// Whether `program` was run or launched at all
    pub fn touched(&self, program: &str) -> bool {
        self.runs().iter().chain(self.spawned().iter()).any(|i| i.program == program)
    }

    fn reply(&self, invocation: &Invocation) -> Reply {
        let line = invocation.command_line();
        if let Some(message) = self.errors.lock().unwrap().get(&line) {
            return Reply::Error(message.clone());
        }
        if let Some(out) = self.by_command_line.lock().unwrap().get(&line) {
            return Reply::Output(out.clone());
        }
        if let Some(out) = self.by_program.lock().unwrap().get(&invocation.program) {
            return Reply::Output(out.clone());
        }
        Reply::Error(format!("not scripted: {}", line))
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, invocation: &Invocation, _timeout: Option<Duration>) -> Result<CommandOutput> {
        self.runs.lock().unwrap().push(invocation.clone());
        match self.reply(invocation) {
            Reply::Output(out) => Ok(out),
            Reply::Error(message) => Err(TtsMicError::Process(message)),
        }
    }

    fn spawn_detached(&self, invocation: Invocation) {
        self.spawned.lock().unwrap().push(invocation);
    }
}

/// `pactl list short` style listing for the given names
pub fn listing(names: &[&str]) -> String {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}\t{}\tmodule-null-sink.c\ts16le 2ch 44100Hz\tIDLE\n", i + 40, name))
        .collect()
}

pub struct FakeProber {
    available: HashSet<String>,
    probes: Mutex<Vec<String>>,
}

impl FakeProber {
    pub fn with(tools: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            available: tools.iter().map(|t| t.to_string()).collect(),
            probes: Mutex::new(Vec::new()),
        })
    }

    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }
}

impl ToolProber for FakeProber {
    fn has_command(&self, name: &str) -> bool {
        self.probes.lock().unwrap().push(name.to_string());
        self.available.contains(name)
    }
}

/// Temp directory holding (empty) setup and teardown scripts
pub fn scripts_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(SETUP_SCRIPT), "#!/bin/sh\n").unwrap();
    std::fs::write(dir.path().join(TEARDOWN_SCRIPT), "#!/bin/sh\n").unwrap();
    dir
}

/// Command line the provisioner uses for a script in `dir`
pub fn script_line(dir: &Path, script: &str, args: &[&str]) -> String {
    let mut line = format!("bash {}", dir.join(script).display());
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Fresh config file in `dir` pointing at `scripts`
pub fn config_in(dir: &Path, scripts: &Path) -> Config {
    let mut config = Config::load_from(dir.join("ttsmic.cfg")).unwrap();
    config.set("routing", "scripts_dir", &scripts.to_string_lossy());
    config
}

/// An existing audio file to play
pub fn audio_file(dir: &Path) -> PathBuf {
    let path = dir.join("tts_1.wav");
    std::fs::write(&path, b"RIFF....WAVE").unwrap();
    path
}
