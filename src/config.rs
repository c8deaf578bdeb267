//! Configuration for the progress client.
//!
//! Settings are read from `.pulse/pulse.toml` and layered file → environment →
//! CLI. Every key is optional; missing keys take the defaults shown below.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:8000"
//! stream_path = "/api/tasks/{task_id}/stream"
//! status_path = "/api/tasks/{task_id}/status"
//! results_path = "/reports/{task_id}"
//! request_timeout_ms = 10000
//!
//! [progress]
//! reconnect_interval_ms = 3000
//! max_reconnect_attempts = 5
//! heartbeat_timeout_ms = 30000
//! # heartbeat_check_interval_ms = 15000   # defaults to heartbeat_timeout_ms / 2
//! polling_interval_ms = 2000
//! auto_connect = true
//! enable_fallback = true
//!
//! [logging]
//! format = "text"          # or "json"
//! # file = ".pulse/logs/pulse.log"
//! ```
//!
//! Environment overrides: `PULSE_BASE_URL`, `PULSE_ENABLE_FALLBACK`,
//! `PULSE_POLLING_INTERVAL_MS`. The bearer token is not part of this file; see
//! [`crate::credentials`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::supervisor::ReconnectPolicy;

/// Name of the per-project configuration directory.
pub const CONFIG_DIR: &str = ".pulse";

/// Name of the configuration file inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "pulse.toml";

/// Backend endpoints. Paths are templates expanded with `{task_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
    /// Where the finished report can be viewed
    #[serde(default = "default_results_path")]
    pub results_path: String,
    /// Timeout for a single status fetch (the stream itself has none)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_stream_path() -> String {
    "/api/tasks/{task_id}/stream".to_string()
}

fn default_status_path() -> String {
    "/api/tasks/{task_id}/status".to_string()
}

fn default_results_path() -> String {
    "/reports/{task_id}".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_path: default_stream_path(),
            status_path: default_status_path(),
            results_path: default_results_path(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ServerSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Reconnection, heartbeat and fallback tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSection {
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// How often the heartbeat deadline is checked; `None` means half the timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_check_interval_ms: Option<u64>,
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    #[serde(default = "default_true")]
    pub enable_fallback: bool,
}

fn default_reconnect_interval_ms() -> u64 {
    3_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}

fn default_polling_interval_ms() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

impl Default for ProgressSection {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            heartbeat_check_interval_ms: None,
            polling_interval_ms: default_polling_interval_ms(),
            auto_connect: true,
            enable_fallback: true,
        }
    }
}

impl ProgressSection {
    /// Freeze the reconnection settings into an immutable policy.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let policy = ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_interval_ms),
            self.max_reconnect_attempts,
            Duration::from_millis(self.heartbeat_timeout_ms),
        );
        match self.heartbeat_check_interval_ms {
            Some(ms) => policy.with_heartbeat_check_interval(Duration::from_millis(ms)),
            None => policy,
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                message: format!("'{}' is not one of: text, json", s),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    /// Write logs to this file (daily rotation) instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// The complete pulse.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub progress: ProgressSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PulseToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `pulse.toml` from a config directory, or defaults if it doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PULSE_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.server.base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup("PULSE_ENABLE_FALLBACK") {
            self.progress.enable_fallback = parse_bool("PULSE_ENABLE_FALLBACK", &raw)?;
        }
        if let Some(raw) = lookup("PULSE_POLLING_INTERVAL_MS") {
            self.progress.polling_interval_ms =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "PULSE_POLLING_INTERVAL_MS".to_string(),
                        message: format!("'{}' is not a number of milliseconds", raw),
                    })?;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let server = &self.server;
        let progress = &self.progress;

        if !(server.base_url.starts_with("http://") || server.base_url.starts_with("https://")) {
            warnings.push(format!(
                "base_url '{}' should start with http:// or https://",
                server.base_url
            ));
        }
        for (key, path) in [
            ("stream_path", &server.stream_path),
            ("status_path", &server.status_path),
            ("results_path", &server.results_path),
        ] {
            if !path.contains("{task_id}") {
                warnings.push(format!(
                    "{} '{}' does not contain a {{task_id}} placeholder",
                    key, path
                ));
            }
        }
        if server.request_timeout_ms == 0 {
            warnings.push("request_timeout_ms must be greater than zero".to_string());
        }
        if progress.reconnect_interval_ms == 0 {
            warnings.push("reconnect_interval_ms of 0 retries in a tight loop".to_string());
        }
        if progress.polling_interval_ms == 0 {
            warnings.push("polling_interval_ms must be greater than zero".to_string());
        }
        if progress.heartbeat_timeout_ms == 0 {
            warnings.push("heartbeat_timeout_ms must be greater than zero".to_string());
        }
        if let Some(check) = progress.heartbeat_check_interval_ms {
            if check == 0 {
                warnings.push("heartbeat_check_interval_ms must be greater than zero".to_string());
            } else if check > progress.heartbeat_timeout_ms {
                warnings.push(format!(
                    "heartbeat_check_interval_ms ({}) exceeds heartbeat_timeout_ms ({}); dead connections will be detected late",
                    check, progress.heartbeat_timeout_ms
                ));
            }
        }
        if progress.max_reconnect_attempts == 0 && !progress.enable_fallback {
            warnings.push(
                "max_reconnect_attempts = 0 with enable_fallback = false fails on the first dropped connection"
                    .to_string(),
            );
        }

        warnings
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}' is not a boolean", raw),
        }),
    }
}

/// Resolved configuration for one invocation.
///
/// Merges, in increasing precedence:
/// 1. `.pulse/pulse.toml`
/// 2. Environment variables
/// 3. CLI arguments (applied by the caller on `toml`)
#[derive(Debug, Clone)]
pub struct PulseConfig {
    pub project_dir: PathBuf,
    pub config_dir: PathBuf,
    pub toml: PulseToml,
}

impl PulseConfig {
    /// Load from a project directory, applying process environment overrides.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(project_dir, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(project_dir: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_dir = project_dir.join(CONFIG_DIR);
        let mut toml = PulseToml::load_or_default(&config_dir)?;
        toml.apply_env(lookup)?;

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            config_dir,
            toml,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn server(&self) -> &ServerSection {
        &self.toml.server
    }

    pub fn progress(&self) -> &ProgressSection {
        &self.toml.progress
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let toml = PulseToml::default();
        assert_eq!(toml.progress.reconnect_interval_ms, 3000);
        assert_eq!(toml.progress.max_reconnect_attempts, 5);
        assert_eq!(toml.progress.heartbeat_timeout_ms, 30_000);
        assert_eq!(toml.progress.polling_interval_ms, 2000);
        assert!(toml.progress.auto_connect);
        assert!(toml.progress.enable_fallback);
        assert_eq!(toml.server.base_url, "http://localhost:8000");
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn empty_file_parses_to_defaults() {
        assert_eq!(PulseToml::parse("").unwrap(), PulseToml::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let content = r#"
[progress]
max_reconnect_attempts = 2
enable_fallback = false

[logging]
format = "json"
"#;
        let toml = PulseToml::parse(content).unwrap();
        assert_eq!(toml.progress.max_reconnect_attempts, 2);
        assert!(!toml.progress.enable_fallback);
        assert_eq!(toml.progress.reconnect_interval_ms, 3000);
        assert_eq!(toml.logging.format, LogFormat::Json);
        assert_eq!(toml.server, ServerSection::default());
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = PulseToml::parse("[progress\nmax = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reconnect_policy_defaults_check_interval_to_half_timeout() {
        let policy = ProgressSection::default().reconnect_policy();
        assert_eq!(policy.interval(), Duration::from_secs(3));
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.heartbeat_timeout(), Duration::from_secs(30));
        assert_eq!(policy.heartbeat_check_interval(), Duration::from_secs(15));

        let section = ProgressSection {
            heartbeat_check_interval_ms: Some(5_000),
            ..Default::default()
        };
        assert_eq!(
            section.reconnect_policy().heartbeat_check_interval(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let mut toml = PulseToml::parse("[progress]\npolling_interval_ms = 5000\n").unwrap();
        toml.apply_env(env(&[
            ("PULSE_BASE_URL", "https://reports.example.com"),
            ("PULSE_ENABLE_FALLBACK", "off"),
            ("PULSE_POLLING_INTERVAL_MS", "750"),
        ]))
        .unwrap();

        assert_eq!(toml.server.base_url, "https://reports.example.com");
        assert!(!toml.progress.enable_fallback);
        assert_eq!(toml.progress.polling_interval_ms, 750);
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let mut toml = PulseToml::default();
        let err = toml
            .apply_env(env(&[("PULSE_ENABLE_FALLBACK", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("PULSE_ENABLE_FALLBACK"));

        let err = toml
            .apply_env(env(&[("PULSE_POLLING_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut toml = PulseToml::default();
        toml.server.base_url = "localhost:8000".into();
        toml.server.stream_path = "/api/stream".into();
        toml.progress.heartbeat_check_interval_ms = Some(60_000);
        toml.progress.polling_interval_ms = 0;

        let warnings = toml.validate();
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().any(|w| w.contains("base_url")));
        assert!(warnings.iter().any(|w| w.contains("stream_path")));
        assert!(warnings.iter().any(|w| w.contains("heartbeat_check_interval_ms")));
        assert!(warnings.iter().any(|w| w.contains("polling_interval_ms")));
    }

    #[test]
    fn save_and_load_from_project_dir() {
        let dir = TempDir::new().unwrap();
        let mut toml = PulseToml::default();
        toml.progress.max_reconnect_attempts = 9;
        toml.save(&dir.path().join(CONFIG_DIR).join(CONFIG_FILE)).unwrap();

        let config = PulseConfig::load_with_env(dir.path(), |_| None).unwrap();
        assert_eq!(config.progress().max_reconnect_attempts, 9);
        assert!(config.config_path().ends_with(".pulse/pulse.toml"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = PulseConfig::load_with_env(dir.path(), |_| None).unwrap();
        assert_eq!(config.toml, PulseToml::default());
    }

    #[test]
    fn log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
