//! Configuration management

use crate::audio::devices::{DEFAULT_SINK_NAME, SINK_ENV};
use crate::{Result, TtsMicError};
use ini::Ini;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
///
/// Backed by an INI file (`~/.ttsmic.cfg` unless another path is given).
/// Missing keys fall back to built-in defaults, so an old config file keeps
/// working after new settings are added.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path
    path: PathBuf,
}

impl Config {
    /// Load `~/.ttsmic.cfg`, creating it with defaults if missing
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load from an explicit path, creating it with defaults if missing
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| TtsMicError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default at {:?}", path);
            let default = Self::default_config();
            default
                .write_to_file(&path)
                .map_err(|e| TtsMicError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self { ini, path })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        debug!("Saving config to {:?}", self.path);
        self.ini
            .write_to_file(&self.path)
            .map_err(|e| TtsMicError::Config(format!("Failed to save config: {}", e)))
    }

    /// Default config file path (~/.ttsmic.cfg)
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ttsmic.cfg")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("server"))
            .set("address", "127.0.0.1:5002")
            .set("voice", "")
            .set("language", "")
            .set("emotion", "")
            .set("voice_description", "")
            .set("output_dir", "");

        ini.with_section(Some("routing"))
            .set("os", "auto")
            .set("sink_name", "")
            .set("monitor_to_speakers", "false")
            .set("device_hint", "")
            .set("auto_play", "true")
            .set("scripts_dir", "");

        ini.with_section(Some("timeouts"))
            .set("query_secs", "5")
            .set("script_secs", "60")
            .set("http_secs", "30");

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get an integer value from config
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    /// A trimmed value, `None` when unset or blank
    fn get_optional(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get_from(Some(section), key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn get_secs(&self, key: &str, default: i64) -> Duration {
        let secs = self.get_int("timeouts", key, default).max(1);
        Duration::from_secs(secs as u64)
    }

    // [server]

    /// TTS server address (`host:port` or a full URL)
    pub fn server_address(&self) -> String {
        self.get_optional("server", "address")
            .unwrap_or_else(|| "127.0.0.1:5002".to_string())
    }

    /// Voice reference file on the server
    pub fn voice(&self) -> Option<String> {
        self.get_optional("server", "voice")
    }

    pub fn language(&self) -> Option<String> {
        self.get_optional("server", "language")
    }

    pub fn emotion(&self) -> Option<String> {
        self.get_optional("server", "emotion")
    }

    pub fn voice_description(&self) -> Option<String> {
        self.get_optional("server", "voice_description")
    }

    /// Where synthesized audio files are written
    pub fn output_dir(&self) -> PathBuf {
        if let Some(dir) = self.get_optional("server", "output_dir") {
            return PathBuf::from(dir);
        }
        dirs::data_local_dir()
            .map(|d| d.join("ttsmic"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("audio_output")
    }

    // [routing]

    /// Requested OS mode (`auto`, `linux`, `windows`, `macos`)
    pub fn os_mode(&self) -> String {
        self.get_optional("routing", "os")
            .unwrap_or_else(|| "auto".to_string())
    }

    /// Virtual sink name: config, then `$TTSMIC_SINK`, then the default
    pub fn sink_name(&self) -> String {
        self.get_optional("routing", "sink_name")
            .or_else(|| {
                std::env::var(SINK_ENV)
                    .ok()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
            .unwrap_or_else(|| DEFAULT_SINK_NAME.to_string())
    }

    /// Also loop the virtual sink to the speakers so the user hears it
    pub fn monitor_to_speakers(&self) -> bool {
        self.get_bool("routing", "monitor_to_speakers", false)
    }

    /// Device name hint shown in the Windows/macOS instructions
    pub fn device_hint(&self) -> Option<String> {
        self.get_optional("routing", "device_hint")
    }

    /// Route synthesized audio to the virtual microphone automatically
    pub fn auto_play(&self) -> bool {
        self.get_bool("routing", "auto_play", true)
    }

    /// Directory holding the setup/teardown scripts
    ///
    /// Unless configured: `scripts/` next to the executable, else `./scripts`.
    pub fn scripts_dir(&self) -> PathBuf {
        if let Some(dir) = self.get_optional("routing", "scripts_dir") {
            return PathBuf::from(dir);
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.join("scripts")))
            .filter(|dir| dir.is_dir())
            .unwrap_or_else(|| PathBuf::from("scripts"))
    }

    // [timeouts]

    /// Limit for each `pactl` / `command -v` call
    pub fn query_timeout(&self) -> Duration {
        self.get_secs("query_secs", 5)
    }

    /// Limit for the setup/teardown scripts
    pub fn script_timeout(&self) -> Duration {
        self.get_secs("script_secs", 60)
    }

    /// Limit for TTS server requests
    pub fn http_timeout(&self) -> Duration {
        self.get_secs("http_secs", 30)
    }
}
