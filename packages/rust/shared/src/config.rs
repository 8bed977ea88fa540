//! Application configuration for Lectern.
//!
//! User config lives at `~/.lectern/lectern.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LecternError, Result};
use crate::types::OutputFormat;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lectern.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lectern";

/// Checkpoint cache database file name, stored next to the config.
const DB_FILE_NAME: &str = "lectern.db";

// ---------------------------------------------------------------------------
// Config structs (matching lectern.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenAI-compatible service settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Retry/backoff policy for transformation calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default output directory for compiled documents.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Default output container format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Default chunk size budget in characters.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Default maximum concurrent transformation calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: OutputFormat::default(),
            chunk_chars: default_chunk_chars(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}
fn default_chunk_chars() -> usize {
    120_000
}
fn default_concurrency() -> u32 {
    4
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default model to use for transformation.
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            default_model: default_model(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4.1-mini".into()
}

/// `[retry]` section.
///
/// Interval grows as `initial * 2^attempt` with up to 10% jitter, capped at
/// `max_interval_ms`. `max_attempts` counts total attempts, not retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per chunk before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff interval in milliseconds.
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Backoff interval ceiling in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_interval_ms() -> u64 {
    1_000
}
fn default_max_interval_ms() -> u64 {
    30_000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lectern/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LecternError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lectern/lectern.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the path to the checkpoint cache database (`~/.lectern/lectern.db`).
pub fn db_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(DB_FILE_NAME))
}

/// Load the user config, falling back to defaults when no file exists.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;
    if !path.exists() {
        tracing::debug!(?path, "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    load_config_from(&path)
}

/// Load config from an explicit path. Missing keys take their defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LecternError::io(path, e))?;
    toml::from_str(&content)
        .map_err(|e| LecternError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LecternError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(LecternError::config(format!(
            "config file already exists at {}",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LecternError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LecternError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Sanity-check config values that would make a run misbehave.
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.defaults.concurrency == 0 {
        return Err(LecternError::validation("concurrency must be at least 1"));
    }
    if config.defaults.chunk_chars == 0 {
        return Err(LecternError::validation("chunk_chars must be at least 1"));
    }
    if config.retry.max_attempts == 0 {
        return Err(LecternError::validation("retry.max_attempts must be at least 1"));
    }
    url::Url::parse(&config.openai.base_url).map_err(|e| {
        LecternError::config(format!(
            "invalid openai.base_url {:?}: {e}",
            config.openai.base_url
        ))
    })?;
    Ok(())
}

/// Check that the API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openai.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(LecternError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
