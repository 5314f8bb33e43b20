use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ClipsyncError, ClipsyncResult};

/// Top-level client configuration (loaded from clipsync.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipsyncConfig {
    pub server: ServerConfig,
    pub crypto: CryptoConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
}

/// Companion desktop server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host or IP of the companion server (empty = not configured)
    pub host: String,
    /// HTTP port (default: 8000)
    pub port: u16,
    /// "http" or "https"
    pub scheme: String,
    /// Refuse plaintext HTTP endpoints instead of warning
    pub enforce_tls: bool,
    /// Per-request timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,
}

/// Envelope encryption settings.
///
/// The KDF parameters are fixed by the wire format and not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Streaming cipher chunk size in bytes (default: 8192)
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Where downloaded files land when no output path is given
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8000,
            scheme: "http".into(),
            enforce_tls: false,
            timeout_secs: 30,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self { buffer_size: 8192 }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("~/Downloads/clipsync"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ClipsyncConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> ClipsyncResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClipsyncResult<()> {
        if self.crypto.buffer_size == 0 {
            return Err(ClipsyncError::Config(
                "crypto.buffer_size must be greater than zero".into(),
            ));
        }
        match self.server.scheme.as_str() {
            "http" | "https" => Ok(()),
            other => Err(ClipsyncError::Config(format!(
                "server.scheme must be \"http\" or \"https\", got \"{other}\""
            ))),
        }
    }
}

impl ServerConfig {
    /// Base URL of the companion server, e.g. `http://192.168.0.171:8000`.
    ///
    /// If `enforce_tls` is true and the scheme is http, this returns an error.
    /// Otherwise, a warning is logged for non-HTTPS endpoints.
    pub fn base_url(&self) -> ClipsyncResult<String> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ClipsyncError::Config("no server host configured".into()));
        }

        if self.scheme == "http" {
            if self.enforce_tls {
                return Err(ClipsyncError::Config(format!(
                    "server {host} uses plaintext HTTP, but enforce_tls is enabled. \
                     Use scheme = \"https\" or set server.enforce_tls = false."
                )));
            }
            tracing::warn!(
                host,
                "companion server uses plaintext HTTP; only envelope-encrypted payloads are protected"
            );
        }

        Ok(format!(
            "{}://{}:{}",
            self.scheme,
            host.trim_end_matches('/'),
            self.port
        ))
    }
}

impl TransferConfig {
    /// `download_dir` with a leading `~/` expanded to `$HOME`.
    pub fn resolved_download_dir(&self) -> PathBuf {
        expand_tilde(&self.download_dir)
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}
