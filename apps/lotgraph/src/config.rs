//! # Configuration
//!
//! Optional TOML configuration file with environment overrides.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [storage]
//! backend = "redb"
//! database = "lotgraph.db"
//!
//! [notary]
//! url = "https://notary.internal"
//! timeout_ms = 5000
//!
//! [security]
//! api_key = "secret"
//! rate_limit = 100
//! cors_origins = ["https://dashboard.example"]
//! ```
//!
//! ## Environment Overrides
//!
//! - `LOTGRAPH_API_KEY`: bearer key required by the HTTP API
//! - `LOTGRAPH_RATE_LIMIT`: requests per second, 0 disables limiting
//! - `LOTGRAPH_CORS_ORIGINS`: comma-separated origins, or `*`
//! - `LOTGRAPH_NOTARY_URL`: base URL of the notarization service

use clap::ValueEnum;
use lotgraph_core::LotgraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Maximum accepted config file size (64 KiB).
const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

/// Default rate limit: 100 requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

// =============================================================================
// SECTIONS
// =============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Disk-backed redb database.
    #[default]
    Redb,
    /// Volatile in-memory ledger.
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redb => write!(f, "redb"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: Option<Backend>,
    pub database: Option<PathBuf>,
}

/// Where mint requests are sent after each committed creation call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotaryConfig {
    /// Base URL of the notarization service. Unset logs mints locally.
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// Bearer key required on every route but `/health`.
    pub api_key: Option<String>,
    /// Requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
    /// Allowed CORS origins; `None` restricts to localhost.
    pub cors_origins: Option<Vec<String>>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub notary: NotaryConfig,
    pub security: SecurityConfig,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, LotgraphError> {
        toml::from_str(text)
            .map_err(|e| LotgraphError::SerializationError(format!("Invalid config: {e}")))
    }

    /// Load the config file (if any) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, LotgraphError> {
        let config = match path {
            Some(path) => {
                let metadata = std::fs::metadata(path).map_err(|e| {
                    LotgraphError::IoError(format!("Cannot read config '{}': {e}", path.display()))
                })?;
                if metadata.len() > MAX_CONFIG_FILE_SIZE {
                    return Err(LotgraphError::SerializationError(format!(
                        "Config file size {} bytes exceeds maximum allowed {} bytes",
                        metadata.len(),
                        MAX_CONFIG_FILE_SIZE
                    )));
                }
                let text = std::fs::read_to_string(path)
                    .map_err(|e| LotgraphError::IoError(format!("Read config: {e}")))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply `LOTGRAPH_*` overrides from `lookup`.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup("LOTGRAPH_API_KEY") {
            // An empty key disables authentication.
            self.security.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(raw) = lookup("LOTGRAPH_RATE_LIMIT") {
            match raw.trim().parse() {
                Ok(rps) => self.security.rate_limit = rps,
                Err(_) => tracing::warn!("Ignoring invalid LOTGRAPH_RATE_LIMIT '{}'", raw),
            }
        }
        if let Some(raw) = lookup("LOTGRAPH_CORS_ORIGINS") {
            self.security.cors_origins = Some(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(url) = lookup("LOTGRAPH_NOTARY_URL") {
            self.notary.url = Some(url).filter(|u| !u.is_empty());
        }
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
