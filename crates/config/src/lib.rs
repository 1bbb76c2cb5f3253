//! Configuration loading, validation, and management for erpeto.
//!
//! Loads configuration from `~/.erpeto/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.erpeto/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Event collection settings
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Event reassembly settings
    #[serde(default)]
    pub reassembly: ReassemblyConfig,

    /// Dependency discovery settings
    #[serde(default)]
    pub analyser: AnalyserConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// When the collection deadline starts counting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutMode {
    /// The whole collection call is bounded by the timeout
    #[default]
    FromCallStart,

    /// The timeout only starts once the first event arrived
    FromFirstEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Page the capture started on; used for same-origin filtering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,

    /// Ignore requests to other origins than `start_url`
    #[serde(default = "default_true")]
    pub keep_only_same_origin: bool,

    /// Disable all URL filtering
    #[serde(default)]
    pub collect_all: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub timeout_mode: TimeoutMode,

    /// URLs containing any of these are ignored
    #[serde(default)]
    pub blocked_url_substrings: Vec<String>,

    /// URL path suffixes of static assets
    #[serde(default = "default_ignored_extensions")]
    pub ignored_extensions: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_ignored_extensions() -> Vec<String> {
    [".js", ".svg", ".css"].into_iter().map(String::from).collect()
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            start_url: None,
            keep_only_same_origin: true,
            collect_all: false,
            timeout_secs: default_timeout_secs(),
            timeout_mode: TimeoutMode::default(),
            blocked_url_substrings: vec![],
            ignored_extensions: default_ignored_extensions(),
        }
    }
}

impl RecorderConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassemblyConfig {
    /// Abort the whole run on the first protocol violation
    #[serde(default)]
    pub strict: bool,

    /// Collapse consecutive inputs on the same element
    #[serde(default = "default_true")]
    pub merge_inputs: bool,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            strict: false,
            merge_inputs: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyserConfig {
    /// How many earlier responses and inputs are searched for echoes of
    /// short, non-random query values
    #[serde(default = "default_echo_lookback")]
    pub echo_lookback: usize,

    /// Request headers never treated as dynamic (lowercase, `*` suffix
    /// matches a prefix)
    #[serde(default = "default_constant_headers")]
    pub constant_headers: Vec<String>,

    /// Initial context width, in characters
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Containers shorter than this get a fixed-offset pattern
    #[serde(default = "default_short_container")]
    pub short_container: usize,

    /// Neighbouring tags tried when localizing an HTML attribute
    #[serde(default = "default_max_landmarks")]
    pub max_landmarks: usize,

    /// Longest start-anchored prefix a pattern may carry
    #[serde(default = "default_max_anchor_prefix")]
    pub max_anchor_prefix: usize,
}

fn default_echo_lookback() -> usize {
    10
}
fn default_constant_headers() -> Vec<String> {
    [
        "user-agent",
        "origin",
        "referer",
        "content-length",
        "sec-ch-ua*",
        "content-type",
        "accept",
        "x-requested-with",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_context_window() -> usize {
    6
}
fn default_short_container() -> usize {
    50
}
fn default_max_landmarks() -> usize {
    16
}
fn default_max_anchor_prefix() -> usize {
    4096
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            echo_lookback: default_echo_lookback(),
            constant_headers: default_constant_headers(),
            context_window: default_context_window(),
            short_container: default_short_container(),
            max_landmarks: default_max_landmarks(),
            max_anchor_prefix: default_max_anchor_prefix(),
        }
    }
}

impl AnalyserConfig {
    /// Whether `name` is on the constant-header list.
    pub fn is_constant_header(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.constant_headers.iter().any(|entry| match entry.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name == *entry,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.erpeto/config.toml).
    ///
    /// Environment variables override file values:
    /// - `ERPETO_TIMEOUT_SECS`
    /// - `ERPETO_START_URL`
    /// - `ERPETO_ECHO_LOOKBACK`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in [`load`]).
    ///
    /// [`load`]: AppConfig::load
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(secs) = lookup("ERPETO_TIMEOUT_SECS") {
            self.recorder.timeout_secs = parse_env("ERPETO_TIMEOUT_SECS", &secs)?;
        }

        if let Some(url) = lookup("ERPETO_START_URL") {
            self.recorder.start_url = Some(url);
        }

        if let Some(lookback) = lookup("ERPETO_ECHO_LOOKBACK") {
            self.analyser.echo_lookback = parse_env("ERPETO_ECHO_LOOKBACK", &lookback)?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".erpeto")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recorder.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "recorder.timeout_secs must be > 0".into(),
            ));
        }

        if self.analyser.context_window == 0 {
            return Err(ConfigError::ValidationError(
                "analyser.context_window must be > 0".into(),
            ));
        }

        if self.analyser.echo_lookback == 0 {
            return Err(ConfigError::ValidationError(
                "analyser.echo_lookback must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value: {value:?}")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
