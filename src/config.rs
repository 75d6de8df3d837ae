//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. an explicit `--config` path
//! 2. `$MAILTRIAGE_CONFIG` (environment variable)
//! 3. `~/.config/mailtriage/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailtriage\config.toml` (Windows)
//! 4. Built-in defaults
//!
//! Relative paths in the file are taken as-is (relative to the working
//! directory), matching how `credentials.json` and `token.json` are usually
//! kept next to where the tool is run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Gmail API access.
    pub gmail: GmailConfig,
    /// Provider to store ingestion.
    pub sync: SyncConfig,
    /// Rule document location.
    pub rules: RulesConfig,
    /// Record store location.
    pub store: StoreConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override data directory for the store and logs.
    pub data_dir: Option<PathBuf>,
}

/// Gmail API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    /// OAuth client secrets downloaded from the Google Cloud console.
    pub credentials_file: PathBuf,
    /// Authorized-user token file, created on first login.
    pub token_file: PathBuf,
    /// Gmail search query used when listing messages.
    pub query: String,
    /// API root, overridable for testing against a local server.
    pub api_base: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

/// Provider to store ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Clear the store and reload it on every run.
    pub reload: bool,
    /// Fetch messages newer than the newest stored one.
    pub update: bool,
    /// Maximum number of message ids listed per sync.
    pub limit: usize,
}

/// Rule document location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub path: PathBuf,
}

/// Record store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store file; defaults to `<data_dir>/emails.db`.
    pub path: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_dir: None,
        }
    }
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            credentials_file: PathBuf::from("credentials.json"),
            token_file: PathBuf::from("token.json"),
            query: "category:primary".to_string(),
            api_base: "https://gmail.googleapis.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reload: false,
            update: true,
            limit: 10,
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rules.json"),
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration from `explicit` if given, else from the standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
/// An explicit path that cannot be read or parsed is an error.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config '{}': {e}", path.display()))?;
        let cfg = toml::from_str::<Config>(&contents)
            .map_err(|e| anyhow::anyhow!("Cannot parse config '{}': {e}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded config");
        return Ok(cfg);
    }

    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return Ok(cfg);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Ok(Config::default())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILTRIAGE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailtriage").join("config.toml"))
}

/// Return the data directory for the store and logs.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailtriage")
}

/// Return the record store path.
pub fn store_path(config: &Config) -> PathBuf {
    config
        .store
        .path
        .clone()
        .unwrap_or_else(|| data_dir(config).join("emails.db"))
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    data_dir(config).join("mailtriage.log")
}
