//! ttsmic main entry point
//!
//! Thin command-line front end: parses flags, builds a [`Session`] and
//! prints what the routing layer reports.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process;
use ttsmic::audio::DeviceStatus;
use ttsmic::client::{save_audio, SynthesisRequest, TtsClient};
use ttsmic::router::{PlaybackRoute, RouteResponse};
use ttsmic::state::config::Config;
use ttsmic::state::{Session, SessionOptions};

/// ttsmic -- speak into a voice-chat microphone through a TTS server.
#[derive(Parser, Debug)]
#[command(name = "ttsmic", version, about)]
struct Cli {
    /// Write debug logs to ttsmic.log
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file to use instead of ~/.ttsmic.cfg
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Platform strategy: auto, linux, windows or macos
    #[arg(long, global = true)]
    os: Option<String>,

    /// Virtual sink name
    #[arg(long, global = true)]
    sink: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the virtual microphone (Linux) or show driver instructions
    Setup {
        /// Also play the virtual sink through the speakers
        #[arg(long)]
        monitor: bool,
    },

    /// Remove the virtual microphone
    Teardown,

    /// Show mode, tools, devices and server reachability
    Status,

    /// Route an audio file to the virtual microphone
    Play {
        /// Audio file to play
        file: PathBuf,
    },

    /// Synthesize text and route it to the virtual microphone
    Speak {
        /// Voice reference file on the server
        #[arg(long)]
        voice: Option<String>,

        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        emotion: Option<String>,

        /// Free-form description of the voice
        #[arg(long)]
        description: Option<String>,

        /// Text to speak
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },

    /// List voices available on the TTS server
    Voices,

    /// Upload a reference recording to the TTS server
    Upload {
        /// Audio file to upload
        file: PathBuf,

        /// Replace a reference with the same name
        #[arg(long)]
        overwrite: bool,
    },

    /// Print the resolved OS mode
    Mode,
}

/// Flags for one `speak` call, layered over the config
#[derive(Debug, Default)]
struct SpeakArgs {
    voice: Option<String>,
    language: Option<String>,
    emotion: Option<String>,
    description: Option<String>,
    text: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.debug);

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn init_logging(debug_mode: bool) {
    if debug_mode {
        // Debug mode: write to ttsmic.log
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("ttsmic.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open ttsmic.log for debug logging: {}", e);
                eprintln!("Logging debug output to stderr instead...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .init();
            }
        }
        info!("ttsmic version {} starting (debug mode)", ttsmic::VERSION);
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    info!("Configuration loaded from {:?}", config.path());

    let options = SessionOptions {
        os: cli.os,
        sink: cli.sink,
    };
    let session = Session::new(config, &options)?;

    match cli.command {
        Commands::Setup { monitor } => {
            let monitor = monitor || session.config.monitor_to_speakers();
            Ok(print_response(&session.setup(monitor)))
        }
        Commands::Teardown => Ok(print_response(&session.teardown())),
        Commands::Status => {
            print_status(&session);
            Ok(0)
        }
        Commands::Play { file } => Ok(print_route(&session.playback(&file), &file)),
        Commands::Speak {
            voice,
            language,
            emotion,
            description,
            text,
        } => speak(
            &session,
            SpeakArgs {
                voice,
                language,
                emotion,
                description,
                text,
            },
        ),
        Commands::Voices => {
            let client = client_for(&session)?;
            let voices = client.list_voices()?;
            if voices.is_empty() {
                println!("No voices on {}. Upload one with `ttsmic upload <file>`.", client.base_url());
            }
            for voice in voices {
                println!("{}", voice);
            }
            Ok(0)
        }
        Commands::Upload { file, overwrite } => {
            let audio = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.to_string_lossy().into_owned());
            let stored = client_for(&session)?.upload_reference(&name, &audio, overwrite)?;
            match stored.duration {
                Some(secs) => println!("Stored {} ({:.1}s)", stored.filename, secs),
                None => println!("Stored {}", stored.filename),
            }
            Ok(0)
        }
        Commands::Mode => {
            println!("{}", session.mode());
            Ok(0)
        }
    }
}

fn client_for(session: &Session) -> anyhow::Result<TtsClient> {
    Ok(TtsClient::new(
        &session.config.server_address(),
        session.config.http_timeout(),
    )?)
}

/// Request built from the config, with command-line flags taking priority
fn synthesis_request(config: &Config, args: SpeakArgs) -> SynthesisRequest {
    SynthesisRequest {
        text: args.text.join(" ").trim().to_string(),
        voice: args.voice.or_else(|| config.voice()).unwrap_or_default(),
        language: args.language.or_else(|| config.language()),
        emotion: args.emotion.or_else(|| config.emotion()),
        voice_description: args.description.or_else(|| config.voice_description()),
    }
}

fn speak(session: &Session, args: SpeakArgs) -> anyhow::Result<i32> {
    let config = &session.config;
    let request = synthesis_request(config, args);

    if request.text.is_empty() {
        bail!("speak needs some text");
    }
    if request.voice.trim().is_empty() {
        bail!(
            "No voice selected. Pass --voice NAME or set voice under [server] in {} (`ttsmic voices` lists them)",
            config.path().display()
        );
    }

    let client = client_for(session)?;
    let audio = client.synthesize(&request)?;
    let path = save_audio(&config.output_dir(), &audio).context("Failed to save audio")?;
    println!("Saved {}", path.display());

    if !config.auto_play() {
        return Ok(0);
    }
    Ok(print_route(&session.playback(&path), &path))
}

fn print_response(response: &RouteResponse) -> i32 {
    if response.requires_user_action {
        println!("Action required:\n");
    }
    if response.success {
        println!("{}", response.output);
        0
    } else {
        eprintln!("{}", response.output);
        1
    }
}

fn print_route(route: &PlaybackRoute, file: &Path) -> i32 {
    match route {
        PlaybackRoute::InApp { note } => {
            println!("{}\nFile: {}", note, file.display());
            0
        }
        PlaybackRoute::Dispatched(outcome) if outcome.started => {
            println!(
                "Playing on '{}' via {}",
                outcome.device.as_deref().unwrap_or_default(),
                outcome.backend.as_deref().unwrap_or_default()
            );
            0
        }
        PlaybackRoute::Dispatched(outcome) => {
            eprintln!(
                "Playback failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            1
        }
    }
}

fn print_status(session: &Session) {
    let status = session.status();
    println!("Mode:    {}", status.mode);
    println!("Config:  {}", session.config.path().display());
    println!("Tools:");
    for (name, found) in &status.tools {
        println!("  {:<8} {}", name, if *found { "found" } else { "missing" });
    }
    println!("Devices:");
    println!("  Sink '{}': {}", status.sink_name, status.sink);
    println!("  Source '{}_mic': {}", status.sink_name, status.mic_source);
    println!("  Source '{}.monitor': {}", status.sink_name, status.monitor_source);
    match &status.defaults {
        Some(defaults) => {
            println!("  Default sink: {}", defaults.default_sink.as_deref().unwrap_or("unknown"));
            println!("  Default source: {}", defaults.default_source.as_deref().unwrap_or("unknown"));
        }
        None => println!("  Defaults: unknown (pactl unavailable)"),
    }
    if status.sink == DeviceStatus::Absent {
        println!("Run `ttsmic setup` to create the virtual microphone.");
    }

    let server = session.config.server_address();
    let reachable = TtsClient::new(&server, session.config.http_timeout())
        .and_then(|client| client.health());
    match reachable {
        Ok(true) => println!("Server:  {} (healthy)", server),
        Ok(false) => println!("Server:  {} (responding, but unhealthy)", server),
        Err(e) => println!("Server:  {} ({})", server, e),
    }
}
