//! Layered TOML configuration for Herald.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use herald_client::ClientConfig;
use herald_types::ConfigError;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the config directory.
pub const CONFIG_DIR_ENV: &str = "HERALD_CONFIG_DIR";

/// Environment variable that supplies the stream URL.
pub const URL_ENV: &str = "HERALD_URL";

/// Resolved configuration for a Herald session.
#[derive(Debug, Clone)]
pub struct HeraldConfig {
    pub url: String,
    pub with_credentials: bool,
    pub client: ClientConfig,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub client: ClientSettings,
}

/// `[client]` section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub url: Option<String>,
    pub with_credentials: Option<bool>,
    pub reconnection_time_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub max_redirects: Option<u32>,
    pub max_reconnect_attempts: Option<u32>,
    pub max_line_length: Option<usize>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub with_credentials: Option<bool>,
    pub reconnection_time_ms: Option<u64>,
}

impl HeraldConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables (`HERALD_URL`)
    /// 3. Config file (~/.herald/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"));
        Self::resolve(
            settings,
            overrides,
            std::env::var(URL_ENV).ok(),
            config_dir,
        )
    }

    /// Merge already-loaded sources.
    pub fn resolve(
        settings: SettingsFile,
        overrides: CliOverrides,
        env_url: Option<String>,
        config_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        let file = settings.client;

        // Resolve URL: CLI > env > config file
        let url = overrides
            .url
            .or(env_url)
            .or(file.url)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: format!("url (pass a URL, set {URL_ENV} or add to ~/.herald/config.toml)"),
            })?;

        let with_credentials = overrides
            .with_credentials
            .or(file.with_credentials)
            .unwrap_or(false);

        let mut client = ClientConfig::default();
        if let Some(ms) = overrides
            .reconnection_time_ms
            .or(file.reconnection_time_ms)
        {
            client = client.reconnection_time(Duration::from_millis(ms));
        }
        if let Some(ms) = file.connect_timeout_ms {
            client = client.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(max) = file.max_redirects {
            client = client.max_redirects(max);
        }
        client = client.max_reconnect_attempts(file.max_reconnect_attempts);
        if let Some(max) = file.max_line_length {
            client = client.max_line_length(max);
        }
        client.validate()?;

        Ok(HeraldConfig {
            url,
            with_credentials,
            client,
            config_dir,
        })
    }
}

/// Get the Herald config directory path (~/.herald/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".herald")
}

/// Read and parse a settings file. A missing file is `Ok(None)`.
pub fn read_settings_file(path: &Path) -> Result<Option<SettingsFile>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            });
        }
    };
    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Load a settings file, returning defaults on any error.
pub fn load_settings_file(path: &Path) -> SettingsFile {
    match read_settings_file(path) {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("{e}; using defaults");
            SettingsFile::default()
        }
    }
}
