//! Virtual device provisioning tests
//!
//! The setup script's exit code is only half the verdict; these check that
//! live verification always has the final word.

mod common;

use common::{script_line, scripts_dir, FakeProber, FakeRunner, TIMEOUT};
use std::sync::Arc;
use ttsmic::audio::provision::{SETUP_SCRIPT, TEARDOWN_SCRIPT};
use ttsmic::audio::{CommandOutput, DeviceStatus, Provisioner, SinkSpec};

fn provisioner(runner: &Arc<FakeRunner>, prober: &Arc<FakeProber>, dir: &std::path::Path) -> Provisioner {
    Provisioner::new(
        runner.clone(),
        prober.clone(),
        TIMEOUT,
        dir.to_path_buf(),
        TIMEOUT,
    )
}

const INFO: &str = "Server Name: PulseAudio (on PipeWire 1.0.5)\nDefault Sink: speakers\nDefault Source: foo_mic\n";

#[test]
fn test_missing_pactl_suggests_install() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["dnf", "bash"]);

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("foo"), false);

    assert!(!report.success());
    assert!(!report.script_succeeded);
    assert!(report.message.contains("sudo dnf install"));
    assert!(report.message.contains("pactl"));
    // Nothing was run: no script, no queries
    assert!(runner.runs().is_empty());
}

#[test]
fn test_setup_success_with_mic_source() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.respond(
        &script_line(scripts.path(), SETUP_SCRIPT, &["foo"]),
        CommandOutput::ok("Created sink 'foo'\n"),
    );
    runner.devices(&["speakers", "foo"], &["mic", "foo.monitor", "foo_mic"]);
    runner.respond("pactl info", CommandOutput::ok(INFO));

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("foo"), false);

    assert!(report.success(), "{}", report.message);
    assert_eq!(report.sink_status, DeviceStatus::Present);
    assert_eq!(report.source_status, DeviceStatus::Present);
    assert_eq!(report.detected_source.as_deref(), Some("foo_mic"));
    assert_eq!(report.default_source.as_deref(), Some("foo_mic"));
    assert!(report.message.starts_with("Created sink 'foo'"));
    assert!(report.message.contains("Verification:"));
    assert!(report.message.contains("Sink 'foo': present"));
    assert!(!report.message.contains("Things to check"));

    let script_run = runner
        .runs()
        .into_iter()
        .find(|i| i.program == "bash")
        .unwrap();
    assert!(script_run.env.contains(&("TTSMIC_SINK".to_string(), "foo".to_string())));
    assert!(!script_run.env.iter().any(|(k, _)| k == "TTSMIC_MONITOR_TO_SPEAKERS"));
}

#[test]
fn test_monitor_flag_passed_via_environment() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.respond_program("bash", CommandOutput::ok(""));
    runner.devices(&["foo"], &["foo_mic"]);
    runner.respond("pactl info", CommandOutput::ok(INFO));

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("foo"), true);

    assert!(report.success());
    assert!(report.message.starts_with("OK"));
    let script_run = runner.runs().into_iter().find(|i| i.program == "bash").unwrap();
    assert_eq!(script_run.args.last().map(String::as_str), Some("foo"));
    assert!(script_run
        .env
        .contains(&("TTSMIC_MONITOR_TO_SPEAKERS".to_string(), "1".to_string())));
}

#[test]
fn test_monitor_source_is_enough() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.respond_program("bash", CommandOutput::ok("done"));
    runner.devices(&["foo"], &["foo.monitor"]);
    runner.respond("pactl info", CommandOutput::ok(INFO));

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("foo"), false);

    assert!(report.success());
    assert_eq!(report.detected_source.as_deref(), Some("foo.monitor"));
}

#[test]
fn test_script_success_overridden_when_sources_missing() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.respond_program("bash", CommandOutput::ok("all good"));
    runner.devices(&["foo"], &["some_other_mic"]);
    runner.respond("pactl info", CommandOutput::ok(INFO));

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("foo"), false);

    assert!(report.script_succeeded);
    assert!(!report.success());
    assert_eq!(report.sink_status, DeviceStatus::Present);
    assert_eq!(report.source_status, DeviceStatus::Absent);
    assert_eq!(report.detected_source, None);
    assert!(report.message.contains("setup FAILED"));
    assert!(report.message.contains("Things to check"));
    assert!(report.message.contains("pactl list short sources"));
    assert!(report.message.contains("'foo_mic' or 'foo.monitor': missing"));
}

#[test]
fn test_script_success_overridden_when_sink_missing() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.respond_program("bash", CommandOutput::ok("all good"));
    runner.devices(&["speakers"], &["foo_mic"]);
    runner.respond("pactl info", CommandOutput::ok(INFO));

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("foo"), false);

    assert!(!report.success());
    assert_eq!(report.sink_status, DeviceStatus::Absent);
    assert!(report.message.contains("Sink 'foo': missing"));
}

#[test]
fn test_failed_queries_are_unknown_not_absent() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.respond_program("bash", CommandOutput::ok("all good"));
    runner.respond("pactl list short sinks", CommandOutput::failed(1, "Connection refused"));
    runner.error("pactl list short sources", "timed out");
    runner.respond("pactl info", CommandOutput::failed(1, "Connection refused"));

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("foo"), false);

    assert!(!report.success());
    assert_eq!(report.sink_status, DeviceStatus::Unknown);
    assert_eq!(report.source_status, DeviceStatus::Unknown);
    assert_eq!(report.default_source, None);
    assert!(report.message.contains("could not be verified"));
    assert!(!report.message.contains("setup FAILED"));
    assert!(report.message.contains("Default source: unknown"));
}

#[test]
fn test_script_failure_still_verifies() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.respond_program("bash", CommandOutput::failed(1, "Failed to load module"));
    runner.devices(&["speakers"], &[]);
    runner.respond("pactl info", CommandOutput::ok(INFO));

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("foo"), false);

    assert!(!report.success());
    assert!(!report.script_succeeded);
    assert!(report.message.starts_with("Failed to load module"));
    assert!(report.message.contains("Run `bash"));
    assert!(report.message.contains("Verification:"));
    assert_eq!(report.sink_status, DeviceStatus::Absent);
}

#[test]
fn test_missing_script_reports_expected_path() {
    let scripts = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.devices(&[], &[]);
    runner.respond("pactl info", CommandOutput::ok(INFO));

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("foo"), false);

    assert!(!report.success());
    let expected = scripts.path().join(SETUP_SCRIPT);
    assert!(report.message.contains(&format!("Missing script: {}", expected.display())));
    assert!(report.message.contains("scripts_dir"));
    assert!(!runner.touched("bash"));
}

#[test]
fn test_empty_sink_name_rejected() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);

    let report = provisioner(&runner, &prober, scripts.path()).setup(&SinkSpec::new("  "), false);

    assert!(!report.success());
    assert!(report.message.contains("--sink"));
    assert!(runner.runs().is_empty());
}

#[test]
fn test_teardown_runs_script_without_verification() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.respond(
        &script_line(scripts.path(), TEARDOWN_SCRIPT, &[]),
        CommandOutput::ok("Unloaded module 41\n"),
    );

    let outcome = provisioner(&runner, &prober, scripts.path()).teardown();

    assert!(outcome.success);
    assert_eq!(outcome.output, "Unloaded module 41");
    assert!(!runner.touched("pactl"));
    assert_eq!(runner.runs().len(), 1);
}

#[test]
fn test_teardown_failure_has_next_step() {
    let scripts = scripts_dir();
    let runner = FakeRunner::new();
    let prober = FakeProber::with(&["pactl"]);
    runner.respond_program("bash", CommandOutput::failed(2, ""));

    let outcome = provisioner(&runner, &prober, scripts.path()).teardown();

    assert!(!outcome.success);
    assert!(outcome.output.contains("exit code"));
    assert!(outcome.output.contains("pactl unload-module"));
}
