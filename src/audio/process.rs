//! External program execution
//!
//! Every tool this crate touches (pactl, the provisioning scripts, the
//! playback players, `command -v`) is launched through [`CommandRunner`].
//! Captured runs are synchronous and optionally bounded by a timeout;
//! playback launches are detached and never waited on by the caller.

use crate::{Result, TtsMicError};
use log::{debug, warn};
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// How often a bounded run checks whether the child has exited
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Read size for draining child output
const READ_CHUNK: usize = 4096;

/// A program, its arguments and environment overrides
///
/// Environment overrides are applied to the child only; the parent
/// environment is never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program and arguments joined by spaces (for logs and messages)
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status was zero
    pub success: bool,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout (handy for fakes)
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Non-empty stdout and stderr joined by a newline, trimmed
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Seam between the audio subsystem and the operating system
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture stdout/stderr
    ///
    /// Errors when the program cannot be started or does not finish within
    /// `timeout`. A non-zero exit is NOT an error; check
    /// [`CommandOutput::success`].
    fn run(&self, invocation: &Invocation, timeout: Option<Duration>) -> Result<CommandOutput>;

    /// Launch without waiting and without attached stdio
    ///
    /// Fire-and-forget: the caller keeps no handle and learns nothing about
    /// the outcome. Launch failures are reported through the log only.
    fn spawn_detached(&self, invocation: Invocation);
}

/// [`CommandRunner`] backed by `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation, timeout: Option<Duration>) -> Result<CommandOutput> {
        debug!("Running: {}", invocation.command_line());

        let mut cmd = invocation.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| {
            TtsMicError::Process(format!("Failed to start {}: {}", invocation.program, e))
        })?;
        let deadline = timeout.map(|t| Instant::now() + t);

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let Some(status) = wait_until(&mut child, deadline)? else {
            kill_tree(&mut child, &invocation.program);
            let _ = child.wait();
            return Err(TtsMicError::Timeout {
                program: invocation.program.clone(),
                secs: timeout.map(|t| t.as_secs()).unwrap_or_default(),
            });
        };

        // A background job may inherit the pipes and keep them open after
        // the child itself has exited; the deadline covers draining too
        let (stdout, stdout_closed) = collect(stdout, deadline);
        let (stderr, stderr_closed) = collect(stderr, deadline);
        if !(stdout_closed && stderr_closed) {
            warn!(
                "{} exited but its output stayed open past the deadline; stopping what it left running",
                invocation.program
            );
            kill_tree(&mut child, &invocation.program);
        }

        let output = CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout,
            stderr,
        };
        debug!("{} exited with {:?}", invocation.program, output.code);
        Ok(output)
    }

    fn spawn_detached(&self, invocation: Invocation) {
        let mut cmd = invocation.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut cmd);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch {}: {}", invocation.command_line(), e);
                return;
            }
        };
        debug!("Launched {} with PID {}", invocation.program, child.id());

        let program = invocation.program;
        let reaper = thread::Builder::new()
            .name("ttsmic-reaper".to_string())
            .spawn(move || reap(child, &program));
        if let Err(e) = reaper {
            warn!("Failed to start reaper thread: {}", e);
        }
    }
}

/// Own process group, so a timeout can take down everything the child started
#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_tree(child: &mut Child, program: &str) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // The group id is the child's pid (see `isolate`)
    if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        debug!("Failed to kill process group of {}: {}", program, e);
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill {}: {}", program, e);
    }
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    // Also keeps a Ctrl+C aimed at us from cutting the audio off
    isolate(cmd);
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    cmd.creation_flags(DETACHED_PROCESS);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}

/// Wait for a detached child so it does not linger as a zombie
fn reap(mut child: Child, program: &str) {
    match child.wait() {
        Ok(status) if !status.success() => debug!("{} exited with {}", program, status),
        Ok(_) => debug!("{} finished", program),
        Err(e) => warn!("Failed to wait for {}: {}", program, e),
    }
}

/// Forward a pipe's bytes, chunk by chunk, until EOF
fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Gather drained output until the pipe closes or `deadline` passes
///
/// The flag is false when the deadline cut collection short.
fn collect(rx: Option<Receiver<Vec<u8>>>, deadline: Option<Instant>) -> (String, bool) {
    let Some(rx) = rx else {
        return (String::new(), true);
    };

    let mut bytes = Vec::new();
    let closed = loop {
        let next = match deadline {
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
        };
        match next {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break true,
            Err(RecvTimeoutError::Timeout) => break false,
        }
    };
    (String::from_utf8_lossy(&bytes).into_owned(), closed)
}

/// Wait for exit, giving up at `deadline`
///
/// Returns `Ok(None)` when the deadline passes with the child still running.
fn wait_until(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
