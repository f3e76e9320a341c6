//! Layered configuration for pitchboard (file → environment → CLI).
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev_mode = false
//!
//! [database]
//! path = ".pitchboard/pitchboard.db"
//!
//! [logging]
//! level = "info"          # any EnvFilter directive, e.g. "pitchboard=debug"
//! format = "text"         # or "json"
//! directory = "logs"      # optional; enables daily-rolling log files
//! ```
//!
//! Every key is optional. Environment variables (`PITCHBOARD_HOST`,
//! `PITCHBOARD_PORT`, `PITCHBOARD_DB_PATH`, `PITCHBOARD_LOG_LEVEL`,
//! `PITCHBOARD_LOG_FORMAT`, `PITCHBOARD_LOG_DIR`) override the file, and
//! command-line flags override both.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::pitches::server::ServerConfig;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pitchboard.toml";

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

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format '{}'. Valid values: text, json",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a locally served UI.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".pitchboard/pitchboard.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchboardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub dev_mode: bool,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub log_dir: Option<PathBuf>,
}

impl PitchboardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse configuration from a TOML string; `path` is only used in errors.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the effective configuration: file, then environment, then CLI.
    ///
    /// An explicitly named config file must exist; the default one may not.
    pub fn resolve(
        config_path: Option<&Path>,
        overrides: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(Path::new(DEFAULT_CONFIG_FILE))?,
        };
        config.apply_env()?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PITCHBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PITCHBOARD_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PITCHBOARD_PORT",
                value: port.clone(),
                message: "expected a port number between 0 and 65535".to_string(),
            })?;
        }
        if let Some(path) = lookup("PITCHBOARD_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(level) = lookup("PITCHBOARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("PITCHBOARD_LOG_FORMAT") {
            self.logging.format =
                format
                    .parse()
                    .map_err(|message| ConfigError::InvalidValue {
                        key: "PITCHBOARD_LOG_FORMAT",
                        value: format.clone(),
                        message,
                    })?;
        }
        if let Some(dir) = lookup("PITCHBOARD_LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(path) = &overrides.db_path {
            self.database.path = path.clone();
        }
        if overrides.dev_mode {
            self.server.dev_mode = true;
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        if let Some(dir) = &overrides.log_dir {
            self.logging.directory = Some(dir.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "server.host",
                value: self.server.host.clone(),
                message: "host must not be empty".to_string(),
            });
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "database.path",
                value: String::new(),
                message: "database path must not be empty".to_string(),
            });
        }
        tracing_subscriber::EnvFilter::try_new(&self.logging.level).map_err(|e| {
            ConfigError::InvalidValue {
                key: "logging.level",
                value: self.logging.level.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.database.path.clone(),
            dev_mode: self.server.dev_mode,
        }
    }

    /// Render the effective configuration back to TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
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
    fn test_defaults() {
        let config = PitchboardConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3141);
        assert!(!config.server.dev_mode);
        assert_eq!(
            config.database.path,
            PathBuf::from(".pitchboard/pitchboard.db")
        );
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = PitchboardConfig::parse(
            "[server]\nport = 8080\n\n[logging]\nformat = \"json\"\n",
            Path::new("pitchboard.toml"),
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_error_names_path() {
        let err = PitchboardConfig::parse("[server\nport = 1", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = PitchboardConfig::default();
        config
            .apply_env_from(env(&[
                ("PITCHBOARD_HOST", "0.0.0.0"),
                ("PITCHBOARD_PORT", "9000"),
                ("PITCHBOARD_DB_PATH", "/var/lib/pitchboard.db"),
                ("PITCHBOARD_LOG_FORMAT", "JSON"),
                ("PITCHBOARD_LOG_DIR", "/var/log/pitchboard"),
            ]))
            .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("/var/lib/pitchboard.db"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/var/log/pitchboard"))
        );
    }

    #[test]
    fn test_invalid_env_port() {
        let mut config = PitchboardConfig::default();
        let err = config
            .apply_env_from(env(&[("PITCHBOARD_PORT", "http")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, "PITCHBOARD_PORT");
                assert_eq!(value, "http");
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_env_log_format() {
        let mut config = PitchboardConfig::default();
        let err = config
            .apply_env_from(env(&[("PITCHBOARD_LOG_FORMAT", "xml")]))
            .unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_cli_overrides_beat_env() {
        let mut config = PitchboardConfig::default();
        config
            .apply_env_from(env(&[("PITCHBOARD_PORT", "9000")]))
            .unwrap();
        config.apply_overrides(&CliOverrides {
            port: Some(7000),
            dev_mode: true,
            log_level: Some("debug".into()),
            ..Default::default()
        });
        assert_eq!(config.server.port, 7000);
        assert!(config.server.dev_mode);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let mut config = PitchboardConfig::default();
        config.logging.level = "pitchboard=loud".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                key: "logging.level",
                ..
            })
        ));
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pitchboard.toml");
        std::fs::write(&path, "[database]\npath = \"data/p.db\"\n").unwrap();

        let config = PitchboardConfig::load(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("data/p.db"));

        let missing = dir.path().join("nope.toml");
        assert_eq!(
            PitchboardConfig::load_or_default(&missing).unwrap(),
            PitchboardConfig::default()
        );
        assert!(matches!(
            PitchboardConfig::load(&missing),
            Err(ConfigError::ReadFailed { .. })
        ));
    }

    #[test]
    fn test_server_config_and_toml_roundtrip() {
        let mut config = PitchboardConfig::default();
        config.server.port = 4000;
        let server = config.server_config();
        assert_eq!(server.port, 4000);
        assert_eq!(server.db_path, config.database.path);

        let rendered = config.to_toml().unwrap();
        let back = PitchboardConfig::parse(&rendered, Path::new("x")).unwrap();
        assert_eq!(back, config);
    }
}
