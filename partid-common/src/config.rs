//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Runtime values resolve in this order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is not an error: startup continues with defaults and a warning.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "PARTID_ROOT_FOLDER";

/// Environment variables holding the recognition API key, in priority order
pub const API_KEY_ENV_VARS: [&str; 2] = ["PARTID_RECOGNITION_API_KEY", "GEMINI_API_KEY"];

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "partid.db";

/// Default HTTP port for partid-ident
pub const DEFAULT_PORT: u16 = 5731;

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data folder holding the database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Recognition service configuration
    #[serde(default)]
    pub recognition: RecognitionConfig,

    /// Camera device configuration
    #[serde(default)]
    pub camera: CameraConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path; when set, logs go to this file as well as stdout
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// External recognition service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// API key (lowest priority source, environment wins)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name passed to the service
    #[serde(default = "default_model")]
    pub model: String,

    /// Service base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Camera settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraConfig {
    /// HTTP endpoint returning a single still frame per GET
    #[serde(default)]
    pub snapshot_url: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Load TOML configuration
///
/// Returns defaults (with a warning) when the file does not exist.
/// A file that exists but fails to parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Default configuration file path for the platform
///
/// `~/.config/partid/partid.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("partid").join("partid.toml"))
        .unwrap_or_else(|| PathBuf::from("./partid.toml"))
}

/// Resolve the root folder (CLI → ENV → TOML → compiled default)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("partid"))
        .unwrap_or_else(|| PathBuf::from("./partid_data"))
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// Resolve the recognition API key (ENV → TOML)
///
/// Warns when more than one source carries a key. Only the first valid one is used.
pub fn resolve_recognition_api_key(toml_config: &TomlConfig) -> Result<String> {
    let mut candidates: Vec<(&str, String)> = API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| {
            std::env::var(var)
                .ok()
                .filter(|k| is_valid_key(k))
                .map(|k| (*var, k))
        })
        .collect();

    if let Some(key) = toml_config
        .recognition
        .api_key
        .as_ref()
        .filter(|k| is_valid_key(k))
    {
        candidates.push(("TOML", key.clone()));
    }

    if candidates.len() > 1 {
        let sources: Vec<&str> = candidates.iter().map(|(source, _)| *source).collect();
        warn!(
            "Recognition API key found in multiple sources: {}. Using {}.",
            sources.join(", "),
            sources[0]
        );
    }

    match candidates.into_iter().next() {
        Some((source, key)) => {
            info!("Recognition API key loaded from {}", source);
            Ok(key.trim().to_string())
        }
        None => Err(Error::Config(format!(
            "Recognition API key not configured. Set {} or [recognition] api_key in the TOML config",
            API_KEY_ENV_VARS.join(" or ")
        ))),
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
