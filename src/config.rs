//! Application configuration
//!
//! Values come from a TOML file (the platform config dir, or an explicit
//! path) and are then overridden by command line flags. The resulting
//! `AppConfig` is built once at startup and never mutated afterwards.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::dispatch::SessionPolicy;
use crate::error::ConfigError;
use crate::protocol::SourceSelection;
use crate::transcode::CaptureFormat;

/// Log level applied to the discovery backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    #[default]
    Silent,
    Warn,
    Error,
    Debug,
}

impl LogVerbosity {
    /// `tracing` level directive for this verbosity
    pub fn level_directive(&self) -> &'static str {
        match self {
            LogVerbosity::Silent => "off",
            LogVerbosity::Warn => "warn",
            LogVerbosity::Error => "error",
            LogVerbosity::Debug => "debug",
        }
    }
}

impl FromStr for LogVerbosity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(LogVerbosity::Silent),
            "warn" => Ok(LogVerbosity::Warn),
            "error" => Ok(LogVerbosity::Error),
            "debug" => Ok(LogVerbosity::Debug),
            _ => Err(ConfigError::InvalidVerbosity(s.to_string())),
        }
    }
}

impl fmt::Display for LogVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogVerbosity::Silent => "silent",
            LogVerbosity::Warn => "warn",
            LogVerbosity::Error => "error",
            LogVerbosity::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Build the `EnvFilter` directive string for the given base filter.
///
/// The verbosity only reaches the discovery backend; the pipeline's own
/// warnings stay governed by `base`.
pub fn log_filter(base: &str, verbosity: LogVerbosity) -> String {
    let level = verbosity.level_directive();
    format!(
        "{},mdns_sd={},streamcast::discovery::mdns={}",
        base, level, level
    )
}

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Network interface to browse on (empty means all)
    pub interface: String,
    pub log_verbosity: LogVerbosity,
    pub service_name: String,
    pub address_path: String,
    pub settle_ms: u64,
    pub cooldown_ms: u64,
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            log_verbosity: LogVerbosity::default(),
            service_name: DISCOVERY_SERVICE.to_string(),
            address_path: DISCOVERY_PATH.to_string(),
            settle_ms: SETTLE_INTERVAL.as_millis() as u64,
            cooldown_ms: TRANSPORT_COOLDOWN.as_millis() as u64,
            interval_ms: DISCOVERY_INTERVAL.as_millis() as u64,
            request_timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl DiscoveryConfig {
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn transport_cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Transcoder and session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// RTSP port on the receiver
    pub port: String,
    /// Transcoder executable
    pub ffmpeg: String,
    /// Capture backend; defaults to the host platform's
    pub capture_format: Option<CaptureFormat>,
    /// Skip addresses that already have a live session
    pub dedupe_live: bool,
    /// Cap on simultaneous sessions
    pub max_sessions: Option<usize>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            port: STREAM_PORT.to_string(),
            ffmpeg: DEFAULT_FFMPEG.to_string(),
            capture_format: None,
            dedupe_live: true,
            max_sessions: None,
        }
    }
}

impl StreamConfig {
    pub fn capture_format(&self) -> CaptureFormat {
        self.capture_format.unwrap_or_else(CaptureFormat::host)
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            dedupe_live: self.dedupe_live,
            max_sessions: self.max_sessions,
        }
    }
}

/// Status API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_STATUS_PORT,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub stream: StreamConfig,
    pub status: StatusConfig,
    pub source: SourceSelection,
}

/// Values given on the command line; `None` keeps the file value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub audio_device: Option<String>,
    pub video_device: Option<String>,
    pub interface: Option<String>,
    pub log_verbosity: Option<LogVerbosity>,
    pub ffmpeg: Option<String>,
    pub status_port: Option<u16>,
}

impl AppConfig {
    /// Location of the per-user config file
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "streamcast").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the default location if it exists.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded config from {}", path.display());
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply command line values on top of the loaded file.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(audio) = overrides.audio_device {
            self.source.audio_device = Some(audio);
        }
        if let Some(video) = overrides.video_device {
            self.source.video_device = Some(video);
        }
        if let Some(interface) = overrides.interface {
            self.discovery.interface = interface;
        }
        if let Some(verbosity) = overrides.log_verbosity {
            self.discovery.log_verbosity = verbosity;
        }
        if let Some(ffmpeg) = overrides.ffmpeg {
            self.stream.ffmpeg = ffmpeg;
        }
        if let Some(port) = overrides.status_port {
            self.status.enabled = true;
            self.status.http_port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_constants() {
        let config = AppConfig::default();
        assert_eq!(config.stream.port, "7843");
        assert_eq!(config.discovery.service_name, "streamplay-ip");
        assert_eq!(config.discovery.address_path, "ip");
        assert_eq!(config.discovery.interface, "Wi-Fi");
        assert_eq!(config.discovery.log_verbosity, LogVerbosity::Silent);
        assert_eq!(config.discovery.settle_interval(), Duration::from_secs(1));
        assert!(config.stream.dedupe_live);
        assert!(config.stream.max_sessions.is_none());
        assert!(!config.status.enabled);
    }

    #[test]
    fn test_verbosity_parsing() {
        assert_eq!("debug".parse::<LogVerbosity>().unwrap(), LogVerbosity::Debug);
        assert_eq!("WARN".parse::<LogVerbosity>().unwrap(), LogVerbosity::Warn);
        assert_eq!("silent".parse::<LogVerbosity>().unwrap(), LogVerbosity::Silent);
        assert!(matches!(
            "loud".parse::<LogVerbosity>(),
            Err(ConfigError::InvalidVerbosity(_))
        ));
    }

    #[test]
    fn test_log_filter_targets_discovery_backend() {
        let filter = log_filter("info", LogVerbosity::Silent);
        assert_eq!(filter, "info,mdns_sd=off,streamcast::discovery::mdns=off");

        let filter = log_filter("warn", LogVerbosity::Debug);
        assert!(filter.contains("mdns_sd=debug"));
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [discovery]
            interface = "eth0"
            log_verbosity = "warn"

            [stream]
            capture_format = "v4l2"
            max_sessions = 2

            [source]
            video_device = "/dev/video0"
            "#,
        )
        .unwrap();

        assert_eq!(config.discovery.interface, "eth0");
        assert_eq!(config.discovery.log_verbosity, LogVerbosity::Warn);
        assert_eq!(config.discovery.service_name, "streamplay-ip");
        assert_eq!(config.stream.capture_format(), CaptureFormat::Video4Linux);
        assert_eq!(config.stream.session_policy().max_sessions, Some(2));
        assert_eq!(config.source.video_device.as_deref(), Some("/dev/video0"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = AppConfig::from_toml("[discovery]\nsettle_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file_and_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[discovery]\ninterface = \"en0\"\n[source]\naudio_device = \"Mic1\"").unwrap();

        let mut config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.discovery.interface, "en0");

        config.apply(Overrides {
            audio_device: Some("Mic2".to_string()),
            interface: Some("eth1".to_string()),
            status_port: Some(9000),
            ..Default::default()
        });

        assert_eq!(config.source.audio_device.as_deref(), Some("Mic2"));
        assert_eq!(config.discovery.interface, "eth1");
        assert!(config.status.enabled);
        assert_eq!(config.status.http_port, 9000);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
