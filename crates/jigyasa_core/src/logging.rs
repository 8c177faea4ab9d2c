//! Process-wide log setup for the server and operator commands.
//!
//! # Responsibility
//! - Turn `AppConfig` log fields into one `flexi_logger` backend.
//! - Record panics as structured log events.
//!
//! # Invariants
//! - The backend starts at most once per process. Repeating the same
//!   settings is a no-op; different settings are an error.
//! - Log lines carry ids, counts and durations, never passwords, tokens or
//!   answer text.

use crate::config::AppConfig;
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const LOG_BASENAME: &str = "jigyasa";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_ROTATED_FILES: usize = 5;
const PANIC_PAYLOAD_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Validated logging destination and verbosity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    /// Rolling file directory; stderr only when `None`.
    pub log_dir: Option<PathBuf>,
    /// Copy file output to stderr as well.
    pub mirror_to_stderr: bool,
}

impl LogSettings {
    pub fn new(level: &str, log_dir: Option<&Path>) -> Result<Self, LoggingError> {
        let level = LevelFilter::from_str(level.trim())
            .map_err(|_| LoggingError::UnsupportedLevel(level.to_string()))?;
        if let Some(dir) = log_dir.filter(|dir| !dir.is_absolute()) {
            return Err(LoggingError::RelativeLogDir(dir.to_path_buf()));
        }
        Ok(Self {
            level,
            log_dir: log_dir.map(Path::to_path_buf),
            mirror_to_stderr: false,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, LoggingError> {
        Self::new(&config.log_level, config.log_dir.as_deref())
    }

    pub fn with_stderr_mirror(mut self, mirror: bool) -> Self {
        self.mirror_to_stderr = mirror;
        self
    }

    fn target(&self) -> String {
        match self.log_dir.as_ref() {
            Some(dir) if self.mirror_to_stderr => format!("{}+stderr", dir.display()),
            Some(dir) => dir.display().to_string(),
            None => "stderr".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum LoggingError {
    UnsupportedLevel(String),
    RelativeLogDir(PathBuf),
    CreateDir { path: PathBuf, source: io::Error },
    Backend(String),
    /// A logger with different settings is already running.
    AlreadyInitialized { active: String, requested: String },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected off|error|warn|info|debug|trace"
            ),
            Self::RelativeLogDir(path) => {
                write!(f, "log directory must be absolute: `{}`", path.display())
            }
            Self::CreateDir { path, source } => {
                write!(f, "cannot create log directory `{}`: {source}", path.display())
            }
            Self::Backend(message) => write!(f, "logger failed to start: {message}"),
            Self::AlreadyInitialized { active, requested } => write!(
                f,
                "logging already running as {active}; cannot switch to {requested}"
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Starts the process logger, or checks that the running one matches.
pub fn init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let active = ACTIVE.get_or_try_init(|| start(settings))?;
    if active.settings == *settings {
        Ok(())
    } else {
        Err(LoggingError::AlreadyInitialized {
            active: describe(&active.settings),
            requested: describe(settings),
        })
    }
}

/// Settings of the running logger, if any.
pub fn active_settings() -> Option<&'static LogSettings> {
    ACTIVE.get().map(|active| &active.settings)
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn describe(settings: &LogSettings) -> String {
    format!("level={} target={}", settings.level, settings.target())
}

fn start(settings: &LogSettings) -> Result<ActiveLogger, LoggingError> {
    let spec = settings.level.as_str().to_ascii_lowercase();
    let logger = Logger::try_with_str(&spec)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .format_for_stderr(flexi_logger::detailed_format);

    let logger = match settings.log_dir.as_ref() {
        None => logger.log_to_stderr(),
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            logger
                .log_to_file(FileSpec::default().directory(dir).basename(LOG_BASENAME))
                .rotate(
                    Criterion::Size(ROTATE_AT_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(KEEP_ROTATED_FILES),
                )
                .append()
                .write_mode(WriteMode::BufferAndFlush)
                .format_for_files(flexi_logger::detailed_format)
                .duplicate_to_stderr(if settings.mirror_to_stderr {
                    Duplicate::All
                } else {
                    Duplicate::None
                })
        }
    };

    let handle = logger
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;
    record_panics();
    info!(
        "event=logging_init module=app status=ok version={} os={} level={} target={}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        settings.level,
        settings.target()
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

/// Chains a hook that logs the panic location and a one-line payload.
fn record_panics() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let location = panic
            .location()
            .map_or_else(|| "unknown".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
        let payload = panic
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string payload".to_string());
        error!(
            "event=panic module=app status=error location={} payload={}",
            location,
            one_line(&payload, PANIC_PAYLOAD_LIMIT)
        );
        previous(panic);
    }));
}

fn one_line(value: &str, limit: usize) -> String {
    let flat = value.replace(['\r', '\n'], " ");
    if flat.chars().count() <= limit {
        return flat;
    }
    let mut cut = flat.chars().take(limit).collect::<String>();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::{active_settings, init_logging, one_line, LogSettings, LoggingError};
    use crate::config::AppConfig;
    use log::LevelFilter;
    use std::path::Path;

    #[test]
    fn settings_parse_levels_and_require_absolute_dirs() {
        let settings = LogSettings::new(" WARN ", None).unwrap();
        assert_eq!(settings.level, LevelFilter::Warn);
        assert!(settings.log_dir.is_none());

        assert!(matches!(
            LogSettings::new("chatty", None),
            Err(LoggingError::UnsupportedLevel(_))
        ));
        assert!(matches!(
            LogSettings::new("info", Some(Path::new("logs/dev"))),
            Err(LoggingError::RelativeLogDir(_))
        ));
    }

    #[test]
    fn settings_follow_app_config() {
        let config = AppConfig {
            log_level: "error".to_string(),
            ..AppConfig::default()
        };
        let settings = LogSettings::from_config(&config)
            .unwrap()
            .with_stderr_mirror(true);
        assert_eq!(settings.level, LevelFilter::Error);
        assert!(settings.mirror_to_stderr);
    }

    #[test]
    fn one_line_flattens_and_caps() {
        assert_eq!(one_line("a\nb", 10), "a b");
        assert_eq!(one_line("abcdefgh", 4), "abcd...");
    }

    #[test]
    fn logger_starts_once_and_rejects_different_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LogSettings::new("info", Some(dir.path())).unwrap();

        init_logging(&settings).unwrap();
        init_logging(&settings).unwrap();
        assert_eq!(active_settings(), Some(&settings));

        let louder = LogSettings {
            level: LevelFilter::Debug,
            ..settings.clone()
        };
        assert!(matches!(
            init_logging(&louder),
            Err(LoggingError::AlreadyInitialized { .. })
        ));
        let stderr_only = LogSettings::new("info", None).unwrap();
        assert!(matches!(
            init_logging(&stderr_only),
            Err(LoggingError::AlreadyInitialized { .. })
        ));
    }
}
