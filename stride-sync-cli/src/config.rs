use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use stride_sync_core::HybridSyncOptions;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Backend and collaboration server endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Backend base URL (e.g., "http://localhost:8080")
    pub backend_url: Option<String>,
    /// Live collaboration base URL (e.g., "ws://localhost:8080").
    /// Derived from `backend_url` when not set.
    pub collab_url: Option<String>,
    /// API key sent as a bearer token
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl ServerConfig {
    /// Returns the collaboration URL, deriving `ws(s)://` from the backend URL
    /// if none is set explicitly.
    pub fn collab_url(&self) -> Option<String> {
        if let Some(url) = &self.collab_url {
            return Some(url.clone());
        }
        let backend = self.backend_url.as_ref()?;
        if let Some(rest) = backend.strip_prefix("https://") {
            Some(format!("wss://{}", rest))
        } else {
            backend
                .strip_prefix("http://")
                .map(|rest| format!("ws://{}", rest))
        }
    }
}

/// Hybrid sync timers and flags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between periodic backend backups
    pub backup_interval_secs: u64,
    /// Seconds between offline buffer writes
    pub buffer_interval_secs: u64,
    /// Seconds between connectivity probes
    pub probe_interval_secs: u64,
    /// Back up to the backend even while live collaboration is connected
    pub enable_backend_backup: bool,
    /// Buffer content locally while offline
    pub enable_local_buffer: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            backup_interval_secs: 30,
            buffer_interval_secs: 5,
            probe_interval_secs: 10,
            enable_backend_backup: true,
            enable_local_buffer: true,
        }
    }
}

impl SyncSettings {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    pub fn to_options(&self) -> HybridSyncOptions {
        HybridSyncOptions {
            backup_interval: Duration::from_secs(self.backup_interval_secs.max(1)),
            buffer_interval: Duration::from_secs(self.buffer_interval_secs.max(1)),
            enable_backend_backup: self.enable_backend_backup,
            enable_local_buffer: self.enable_local_buffer,
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the offline buffer
    pub data_dir: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Server endpoints
    pub server: ServerConfig,
    /// Sync timers and flags
    pub sync: SyncSettings,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    server: Option<ServerConfig>,
    sync: Option<SyncSettings>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut config_file = None;
        let mut server = ServerConfig::default();
        let mut sync = SyncSettings::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(server_config) = file_config.server {
                server = server_config;
            }
            if let Some(sync_settings) = file_config.sync {
                sync = sync_settings;
            }
        }

        // Apply environment variable overrides
        if let Ok(dir) = std::env::var("STRIDE_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("STRIDE_BACKEND_URL") {
            server.backend_url = Some(url);
        }
        if let Ok(url) = std::env::var("STRIDE_COLLAB_URL") {
            server.collab_url = Some(url);
        }
        if let Ok(key) = std::env::var("STRIDE_API_KEY") {
            server.api_key = Some(key);
        }

        Ok(Self {
            data_dir,
            config_file,
            server,
            sync,
        })
    }

    /// Directory of the offline buffer inside the data directory
    pub fn buffer_dir(&self) -> PathBuf {
        self.data_dir.value.join("buffer")
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/stride/
    /// - macOS: ~/Library/Application Support/stride/
    /// - Windows: %APPDATA%/stride/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stride")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/stride/
    /// - macOS: ~/Library/Application Support/stride/
    /// - Windows: %APPDATA%/stride/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stride")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
