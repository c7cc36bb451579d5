//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a small TOML file; a missing or unreadable
//! file falls back to built-in defaults. The data folder is resolved in this
//! order:
//! 1. Command-line argument
//! 2. `KINETIC_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML file
//! 4. OS-dependent default

use crate::codec::Delimiter;
use crate::grouping::GROUPING_THRESHOLD;
use crate::selectable::DEFAULT_PATH_SEPARATOR;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the data folder
pub const ROOT_FOLDER_ENV: &str = "KINETIC_ROOT_FOLDER";

/// Database file inside the data folder
pub const DATABASE_FILE: &str = "kinetic.db";

pub const DEFAULT_PORT: u16 = 5790;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP port of the delta-rules service
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub exchange: ExchangeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file (stderr when unset)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum score for a default grouping candidate
    #[serde(default = "default_grouping_threshold")]
    pub grouping_threshold: f64,

    /// Minimum score for a muscle to appear in grouping dropdowns
    #[serde(default)]
    pub selectable_threshold: f64,

    /// Separator of option breadcrumbs
    #[serde(default = "default_path_separator")]
    pub path_separator: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub delimiter: Delimiter,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_grouping_threshold() -> f64 {
    GROUPING_THRESHOLD
}

fn default_path_separator() -> String {
    DEFAULT_PATH_SEPARATOR.to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            exchange: ExchangeConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grouping_threshold: default_grouping_threshold(),
            selectable_threshold: 0.0,
            path_separator: default_path_separator(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse a TOML file, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let (config, warnings) = Self::load_collecting_warnings(path);
        for warning in warnings {
            warn!("{}", warning);
        }
        config
    }

    /// [`TomlConfig::load_or_default`] that returns its warnings instead of
    /// logging them, for callers that load config before tracing is set up
    pub fn load_collecting_warnings(path: Option<&Path>) -> (Self, Vec<String>) {
        let Some(path) = path else {
            return (Self::default(), Vec::new());
        };
        if !path.exists() {
            return (
                Self::default(),
                vec![format!("Config file {} not found, using defaults", path.display())],
            );
        }
        match Self::load(path) {
            Ok(config) => (config, Vec::new()),
            Err(e) => (Self::default(), vec![format!("Ignoring config file: {}", e)]),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.engine.grouping_threshold.is_finite() || !self.engine.selectable_threshold.is_finite() {
            return Err(Error::Config("engine thresholds must be finite numbers".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// `<config dir>/kinetic/config.toml`, when the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kinetic").join("config.toml"))
}

/// OS-dependent default data folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("kinetic"))
        .unwrap_or_else(|| PathBuf::from("./kinetic_data"))
}

/// Resolves the data folder from CLI, environment, TOML and OS default
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self { cli_arg }
    }

    pub fn resolve(&self, config: &TomlConfig) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &config.root_folder {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Prepares the resolved data folder
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5790);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.engine.grouping_threshold, 0.5);
        assert_eq!(config.engine.path_separator, " > ");
        assert_eq!(config.exchange.delimiter, Delimiter::Tab);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "port = 6000\n\n[engine]\npath_separator = \" / \"\n\n[exchange]\ndelimiter = \"comma\"\n",
        )
        .unwrap();

        let config = TomlConfig::load(&path).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.engine.path_separator, " / ");
        assert_eq!(config.engine.grouping_threshold, 0.5);
        assert_eq!(config.exchange.delimiter, Delimiter::Comma);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        assert!(matches!(TomlConfig::load(&path), Err(Error::Config(_))));
        assert_eq!(TomlConfig::load_or_default(Some(&path)), TomlConfig::default());
        assert_eq!(
            TomlConfig::load_or_default(Some(&dir.path().join("missing.toml"))),
            TomlConfig::default()
        );
    }

    #[test]
    fn test_fallbacks_report_warnings() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let (config, warnings) = TomlConfig::load_collecting_warnings(Some(&missing));
        assert_eq!(config, TomlConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("not found"));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "port = 0\n").unwrap();
        let (_, warnings) = TomlConfig::load_collecting_warnings(Some(&broken));
        assert!(warnings[0].starts_with("Ignoring config file"));

        let (_, warnings) = TomlConfig::load_collecting_warnings(None);
        assert!(warnings.is_empty());
    }

    #[test]
    #[serial]
    fn test_cli_beats_env_beats_toml() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };

        std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
        let cli = RootFolderResolver::new(Some(PathBuf::from("/from/cli")));
        assert_eq!(cli.resolve(&config), PathBuf::from("/from/cli"));
        assert_eq!(RootFolderResolver::new(None).resolve(&config), PathBuf::from("/from/env"));

        std::env::remove_var(ROOT_FOLDER_ENV);
        assert_eq!(RootFolderResolver::new(None).resolve(&config), PathBuf::from("/from/toml"));
        assert_eq!(
            RootFolderResolver::new(None).resolve(&TomlConfig::default()),
            default_root_folder()
        );
    }

    #[test]
    fn test_initializer_creates_folder() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("kinetic");
        let init = RootFolderInitializer::new(root.clone());

        init.ensure_directory_exists().unwrap();
        assert!(root.is_dir());
        assert_eq!(init.database_path(), root.join("kinetic.db"));
    }
}
