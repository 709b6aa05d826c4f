//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. the `--config` command-line path
//! 2. `$P7MFIX_CONFIG` (environment variable)
//! 3. `~/.config/p7mfix/config.toml` (Linux/macOS)
//!    `%APPDATA%\p7mfix\config.toml` (Windows)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::batch::{RepairOptions, DEFAULT_BATCH_SIZE};
use crate::error::{RepairError, Result};
use crate::rewrite::RewriteOptions;

/// Implicit TLS port.
pub const IMAPS_PORT: u16 = 993;
/// Plain IMAP port, upgraded with STARTTLS.
pub const IMAP_PORT: u16 = 143;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server and credentials.
    pub main: ServerConfig,
    /// Repair pipeline settings.
    pub repair: RepairConfig,
    /// General behavior settings.
    pub general: GeneralConfig,
}

/// IMAP server and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Defaults to 993 with `ssl`, 143 without.
    pub port: Option<u16>,
    pub username: String,
    /// Implicit TLS when true, STARTTLS otherwise. Accepts booleans and
    /// `"yes"`/`"no"`, `"on"`/`"off"`, `"1"`/`"0"`.
    #[serde(deserialize_with = "bool_like")]
    pub ssl: bool,
    /// Prompted for interactively when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Repair pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// UIDs per structure fetch.
    pub batch_size: usize,
    /// Folder rewritten messages are appended to.
    pub upload_folder: Option<String>,
    /// Folder originals are copied to before being flagged deleted.
    pub trash_folder: Option<String>,
    /// Directory for local `.eml` copies.
    pub save_dir: Option<PathBuf>,
    /// Headers of the embedded message that survive the rewrite.
    pub preserve_headers: Vec<String>,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            username: String::new(),
            ssl: true,
            password: None,
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            upload_folder: None,
            trash_folder: None,
            save_dir: None,
            preserve_headers: RewriteOptions::default().preserve_headers,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl ServerConfig {
    /// Port to connect to, applying the TLS-dependent default.
    pub fn effective_port(&self) -> u16 {
        self.port
            .unwrap_or(if self.ssl { IMAPS_PORT } else { IMAP_PORT })
    }

    /// Check that the settings needed to connect are present.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(RepairError::Config("[main] host is not set".into()));
        }
        if self.username.trim().is_empty() {
            return Err(RepairError::Config("[main] username is not set".into()));
        }
        if self.port == Some(0) {
            return Err(RepairError::Config("[main] port must be non-zero".into()));
        }
        Ok(())
    }
}

impl RepairConfig {
    /// Pipeline options from this section.
    pub fn to_options(&self) -> RepairOptions {
        RepairOptions {
            batch_size: self.batch_size,
            upload_folder: self.upload_folder.clone(),
            trash_folder: self.trash_folder.clone(),
            save_dir: self.save_dir.clone(),
            rewrite: RewriteOptions {
                preserve_headers: self.preserve_headers.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolLike {
    Bool(bool),
    Int(i64),
    Str(String),
}

fn bool_like<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match BoolLike::deserialize(deserializer)? {
        BoolLike::Bool(b) => Ok(b),
        BoolLike::Int(n) => Ok(n != 0),
        BoolLike::Str(s) => parse_bool(&s)
            .ok_or_else(|| de::Error::custom(format!("expected a boolean, got '{s}'"))),
    }
}

/// Parse the usual spellings of a boolean setting.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration.
///
/// An `explicit` path must exist and parse. Otherwise the standard location
/// is used if present, and defaults if not.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => {
            tracing::debug!("No config file, using defaults");
            Ok(Config::default())
        }
    }
}

/// Read and parse one config file.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| RepairError::io(path, e))?;
    let cfg = toml::from_str::<Config>(&contents)
        .map_err(|e| RepairError::Config(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(cfg)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("P7MFIX_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("p7mfix").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("p7mfix")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("p7mfix.log")
}
