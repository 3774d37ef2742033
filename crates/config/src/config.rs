//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is not usable
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// What to watch and how often
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    /// Monitored root directory (default ".")
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Seconds to sleep between scan passes (default 1000)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Directory name pruned from the walk, compared case-insensitively (default "outmp4")
    #[serde(default = "default_excluded_dir_name")]
    pub excluded_dir_name: String,
    /// Allow-listed extensions without the dot, compared case-insensitively
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_poll_interval_secs() -> u64 {
    1000
}

fn default_excluded_dir_name() -> String {
    "outmp4".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["mp4".to_string(), "mkv".to_string()]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            poll_interval_secs: default_poll_interval_secs(),
            excluded_dir_name: default_excluded_dir_name(),
            extensions: default_extensions(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Locations of the persisted path lists
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateConfig {
    /// Paths that ran through the whole pipeline (default "processed_files.txt")
    #[serde(default = "default_processed_list")]
    pub processed_list: PathBuf,
    /// Paths that hit an unrecoverable error (default "failed_files.txt")
    #[serde(default = "default_failed_list")]
    pub failed_list: PathBuf,
}

fn default_processed_list() -> PathBuf {
    PathBuf::from("processed_files.txt")
}

fn default_failed_list() -> PathBuf {
    PathBuf::from("failed_files.txt")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            processed_list: default_processed_list(),
            failed_list: default_failed_list(),
        }
    }
}

/// Scratch directories used while a file is being processed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// Where the transcoder writes before the result replaces the source (default "output_videos")
    #[serde(default = "default_output_video_dir")]
    pub output_video_dir: PathBuf,
    /// Where extracted subtitles land before moving next to the source (default "temp_subtitles")
    #[serde(default = "default_temp_subtitle_dir")]
    pub temp_subtitle_dir: PathBuf,
}

fn default_output_video_dir() -> PathBuf {
    PathBuf::from("output_videos")
}

fn default_temp_subtitle_dir() -> PathBuf {
    PathBuf::from("temp_subtitles")
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            output_video_dir: default_output_video_dir(),
            temp_subtitle_dir: default_temp_subtitle_dir(),
        }
    }
}

/// External program locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe: default_ffprobe(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

/// Probe output decoding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// Encoding labels tried in order on ffprobe stdout; first clean decode wins
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,
}

fn default_encodings() -> Vec<String> {
    ["utf-8", "gbk", "gb2312", "big5"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            encodings: default_encodings(),
        }
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log file path; empty disables the file sink (default "log.txt")
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Filter directive used when RUST_LOG is unset (default "info")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_file() -> String {
    "log.txt".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn file_path(&self) -> Option<PathBuf> {
        let trimmed = self.file.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - SUBSHRINK_WATCH_ROOT -> watch.root
    /// - SUBSHRINK_POLL_INTERVAL_SECS -> watch.poll_interval_secs
    /// - SUBSHRINK_FFMPEG -> tools.ffmpeg
    /// - SUBSHRINK_FFPROBE -> tools.ffprobe
    /// - SUBSHRINK_LOG_LEVEL -> logging.level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SUBSHRINK_WATCH_ROOT") {
            if !val.trim().is_empty() {
                self.watch.root = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("SUBSHRINK_POLL_INTERVAL_SECS") {
            if let Ok(secs) = val.trim().parse::<u64>() {
                self.watch.poll_interval_secs = secs;
            }
        }

        if let Ok(val) = env::var("SUBSHRINK_FFMPEG") {
            if !val.trim().is_empty() {
                self.tools.ffmpeg = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("SUBSHRINK_FFPROBE") {
            if !val.trim().is_empty() {
                self.tools.ffprobe = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("SUBSHRINK_LOG_LEVEL") {
            if !val.trim().is_empty() {
                self.logging.level = val.trim().to_string();
            }
        }
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "watch.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.watch.excluded_dir_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "watch.excluded_dir_name must not be empty".to_string(),
            ));
        }
        if self
            .watch
            .extensions
            .iter()
            .all(|ext| ext.trim_start_matches('.').trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "watch.extensions must list at least one extension".to_string(),
            ));
        }
        if self.probe.encodings.is_empty() {
            return Err(ConfigError::Invalid(
                "probe.encodings must list at least one encoding".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    ///
    /// The returned flag is `true` when the file was found.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<(Self, bool), ConfigError> {
        let (mut config, found) = match Self::load_from_file(path) {
            Ok(config) => (config, true),
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                (Config::default(), false)
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok((config, found))
    }
}
