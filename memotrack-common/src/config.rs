//! Bootstrap configuration and media root resolution
//!
//! Configuration is a small TOML file. Everything in it has a built-in
//! default, so a missing or broken file is not fatal: memotrack warns and
//! starts with defaults.
//!
//! Media root resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `MEMOTRACK_MEDIA_ROOT` environment variable
//! 3. `media_root` in the TOML config file
//! 4. OS-dependent compiled default (the Voice Memos recordings folder)

use crate::events::MAX_CAPACITY;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the media root
pub const MEDIA_ROOT_ENV: &str = "MEMOTRACK_MEDIA_ROOT";

/// Catalog database file name inside the media root
pub const DEFAULT_CATALOG_FILE: &str = "CloudRecordings.db";

/// Catalog table holding one row per recording
pub const DEFAULT_CATALOG_TABLE: &str = "ZCLOUDRECORDING";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder that catalog paths are relative to
    #[serde(default)]
    pub media_root: Option<PathBuf>,

    /// Catalog database, relative to the media root unless absolute
    #[serde(default)]
    pub catalog_file: Option<PathBuf>,

    /// Catalog table name
    #[serde(default = "default_table")]
    pub table: String,

    /// Event bus buffer size (rounded up to a power of two)
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Maximum concurrent file existence checks
    #[serde(default = "default_crossref_concurrency")]
    pub crossref_concurrency: usize,

    /// How long a catalog read waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_table() -> String {
    DEFAULT_CATALOG_TABLE.to_string()
}

fn default_event_bus_capacity() -> usize {
    1024
}

fn default_crossref_concurrency() -> usize {
    16
}

fn default_busy_timeout_ms() -> u64 {
    250
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            media_root: None,
            catalog_file: None,
            table: default_table(),
            event_bus_capacity: default_event_bus_capacity(),
            crossref_concurrency: default_crossref_concurrency(),
            busy_timeout_ms: default_busy_timeout_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(Error::Config("table must not be empty".to_string()));
        }
        if !self
            .table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Config(format!(
                "table name contains invalid characters: {}",
                self.table
            )));
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config(
                "event_bus_capacity must be at least 1".to_string(),
            ));
        }
        if self.event_bus_capacity > MAX_CAPACITY {
            return Err(Error::Config(format!(
                "event_bus_capacity must be at most {}, got {}",
                MAX_CAPACITY, self.event_bus_capacity
            )));
        }
        if self.crossref_concurrency == 0 {
            return Err(Error::Config(
                "crossref_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Combine with the resolved media root into runtime settings
    pub fn into_settings(self, media_root: PathBuf) -> EngineSettings {
        let catalog_file = self
            .catalog_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_FILE));
        let catalog_path = if catalog_file.is_absolute() {
            catalog_file
        } else {
            media_root.join(catalog_file)
        };

        EngineSettings {
            media_root,
            catalog_path,
            table: self.table,
            event_bus_capacity: self.event_bus_capacity,
            crossref_concurrency: self.crossref_concurrency,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

/// Fully resolved settings handed to the ingestion engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub media_root: PathBuf,
    pub catalog_path: PathBuf,
    pub table: String,
    pub event_bus_capacity: usize,
    pub crossref_concurrency: usize,
    pub busy_timeout: Duration,
}

impl EngineSettings {
    /// Settings for a media root with every other value defaulted
    pub fn for_media_root(media_root: impl Into<PathBuf>) -> Self {
        TomlConfig::default().into_settings(media_root.into())
    }
}

/// Load and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Outcome of [`load_or_default`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    /// File the config came from, if any
    pub source: Option<PathBuf>,
    /// Why the built-in defaults were used instead of `source`
    pub fallback: Option<String>,
}

/// Load a config file, falling back to defaults when it is absent or broken
///
/// With no explicit path the platform config location is tried
/// (`<config_dir>/memotrack/config.toml`); no file there is not a fallback.
/// Nothing is logged here because this runs before tracing is set up.
pub fn load_or_default(path: Option<&Path>) -> LoadedConfig {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                return LoadedConfig {
                    config: TomlConfig::default(),
                    source: None,
                    fallback: None,
                }
            }
        },
    };

    match load_toml_config(&path) {
        Ok(config) => LoadedConfig {
            config,
            source: Some(path),
            fallback: None,
        },
        Err(e) => LoadedConfig {
            config: TomlConfig::default(),
            fallback: Some(format!("Failed to load config {}: {}", path.display(), e)),
            source: None,
        },
    }
}

/// Write a config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Platform config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("memotrack").join("config.toml"))
}

/// OS-dependent default media root
///
/// On macOS this is where Voice Memos keeps `CloudRecordings.db` and the
/// `.m4a` files. Other platforms fall back to a folder under the home
/// directory with the same layout.
pub fn default_media_root() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if cfg!(target_os = "macos") {
        home.join("Library")
            .join("Group Containers")
            .join("group.com.apple.VoiceMemos.shared")
            .join("Recordings")
    } else {
        home.join("VoiceMemos").join("Recordings")
    }
}

/// Resolves the media root following the documented priority order
#[derive(Debug, Clone, Default)]
pub struct MediaRootResolver {
    cli_arg: Option<PathBuf>,
}

impl MediaRootResolver {
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self { cli_arg }
    }

    pub fn resolve(&self, config: &TomlConfig) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(MEDIA_ROOT_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &config.media_root {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        default_media_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.table, "ZCLOUDRECORDING");
        assert_eq!(config.event_bus_capacity, 1024);
        assert_eq!(config.crossref_concurrency, 16);
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = TomlConfig {
            event_bus_capacity: 0,
            ..TomlConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_bounds_capacity() {
        let at_max = TomlConfig {
            event_bus_capacity: MAX_CAPACITY,
            ..TomlConfig::default()
        };
        assert!(at_max.validate().is_ok());

        let huge = TomlConfig {
            event_bus_capacity: usize::MAX,
            ..TomlConfig::default()
        };
        assert!(matches!(huge.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_injected_table_name() {
        let config = TomlConfig {
            table: "ZCLOUDRECORDING; DROP TABLE x".to_string(),
            ..TomlConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_catalog_path_relative_to_media_root() {
        let settings = TomlConfig::default().into_settings(PathBuf::from("/memos"));
        assert_eq!(settings.catalog_path, PathBuf::from("/memos/CloudRecordings.db"));
        assert_eq!(settings.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_catalog_path_absolute_override() {
        let config = TomlConfig {
            catalog_file: Some(PathBuf::from("/elsewhere/catalog.db")),
            ..TomlConfig::default()
        };
        let settings = config.into_settings(PathBuf::from("/memos"));
        assert_eq!(settings.catalog_path, PathBuf::from("/elsewhere/catalog.db"));
        assert_eq!(settings.media_root, PathBuf::from("/memos"));
    }

    #[test]
    fn test_cli_arg_wins() {
        let config = TomlConfig {
            media_root: Some(PathBuf::from("/from-toml")),
            ..TomlConfig::default()
        };
        let resolver = MediaRootResolver::new(Some(PathBuf::from("/from-cli")));
        assert_eq!(resolver.resolve(&config), PathBuf::from("/from-cli"));
    }
}
