//! Process configuration built once at startup.
//!
//! # Invariants
//! - `AppConfig` is immutable after `validate()` succeeds and is shared by
//!   reference with every request.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_DATABASE_PATH: &str = "jigyasa.sqlite3";
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` disables file logs.
    pub log_dir: Option<PathBuf>,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub max_upload_bytes: usize,
    /// TrueType font for published reports; the bundled DejaVu Sans when `None`.
    pub report_font: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            report_font: None,
        }
    }
}

impl AppConfig {
    /// Checks cross-field constraints and returns the parsed bind address.
    pub fn validate(&self) -> Result<SocketAddr, ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        let bind_addr = self
            .bind_addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddr(self.bind_addr.clone()))?;
        if let Some(dir) = self.log_dir.as_ref() {
            if !dir.is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir.clone()));
            }
        }
        if self.access_token_ttl_secs == 0 {
            return Err(ConfigError::ZeroValue("access_token_ttl_secs"));
        }
        if self.refresh_token_ttl_secs < self.access_token_ttl_secs {
            return Err(ConfigError::RefreshShorterThanAccess);
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::ZeroValue("max_upload_bytes"));
        }
        Ok(bind_addr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyDatabasePath,
    InvalidBindAddr(String),
    RelativeLogDir(PathBuf),
    ZeroValue(&'static str),
    RefreshShorterThanAccess,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDatabasePath => write!(f, "database path must not be empty"),
            Self::InvalidBindAddr(value) => write!(f, "invalid bind address `{value}`"),
            Self::RelativeLogDir(path) => {
                write!(f, "log directory must be absolute: `{}`", path.display())
            }
            Self::ZeroValue(field) => write!(f, "{field} must be greater than zero"),
            Self::RefreshShorterThanAccess => {
                write!(f, "refresh token ttl must not be shorter than access token ttl")
            }
        }
    }
}

impl Error for ConfigError {}
