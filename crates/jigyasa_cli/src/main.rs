//! `jigyasa` server binary.
//!
//! # Responsibility
//! - Build `AppConfig` from flags and `JIGYASA_*` environment variables.
//! - Bootstrap logging, then serve HTTP or run an operator subcommand.

mod server;

use clap::{Parser, Subcommand};
use jigyasa_core::config::{
    DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_BIND_ADDR, DEFAULT_DATABASE_PATH,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_REFRESH_TOKEN_TTL_SECS,
};
use jigyasa_core::repo::account_repo::SqliteAccountRepository;
use jigyasa_core::service::auth_service::{AuthService, TokenPolicy};
use jigyasa_core::{default_log_level, init_logging, open_db, AppConfig, LogSettings};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "jigyasa")]
#[command(about = "Survey management and CSV analytics server", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "JIGYASA_DATABASE", default_value = DEFAULT_DATABASE_PATH)]
    database: PathBuf,

    /// Listen address
    #[arg(long, env = "JIGYASA_BIND", default_value = DEFAULT_BIND_ADDR)]
    bind: String,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, env = "JIGYASA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; stderr only when unset
    #[arg(long, env = "JIGYASA_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Mirror file logs to stderr
    #[arg(long, env = "JIGYASA_LOG_STDERR")]
    log_stderr: bool,

    #[arg(long, env = "JIGYASA_ACCESS_TTL_SECS", default_value_t = DEFAULT_ACCESS_TOKEN_TTL_SECS)]
    access_ttl_secs: u64,

    #[arg(long, env = "JIGYASA_REFRESH_TTL_SECS", default_value_t = DEFAULT_REFRESH_TOKEN_TTL_SECS)]
    refresh_ttl_secs: u64,

    /// Request body limit in bytes
    #[arg(long, env = "JIGYASA_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// TrueType font for published reports (defaults to bundled DejaVu Sans)
    #[arg(long, env = "JIGYASA_REPORT_FONT")]
    report_font: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Grant or revoke the staff flag for a user
    PromoteStaff {
        /// Account email
        email: String,
        #[arg(long)]
        revoke: bool,
    },
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        AppConfig {
            database_path: self.database.clone(),
            bind_addr: self.bind.clone(),
            log_level: self
                .log_level
                .clone()
                .unwrap_or_else(|| default_log_level().to_string()),
            log_dir: self.log_dir.clone(),
            access_token_ttl_secs: self.access_ttl_secs,
            refresh_token_ttl_secs: self.refresh_ttl_secs,
            max_upload_bytes: self.max_upload_bytes,
            report_font: self.report_font.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = cli.app_config();

    let bind_addr = match config.validate() {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("jigyasa: invalid configuration: {err}");
            return ExitCode::from(2);
        }
    };

    let logging = LogSettings::from_config(&config)
        .map(|settings| settings.with_stderr_mirror(cli.log_stderr))
        .and_then(|settings| init_logging(&settings));
    if let Err(err) = logging {
        eprintln!("jigyasa: {err}");
        return ExitCode::from(2);
    }

    let outcome = match cli.command {
        Some(Command::PromoteStaff { ref email, revoke }) => promote_staff(&config, email, !revoke),
        Some(Command::Serve) | None => server::run(config, bind_addr).await,
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=app_exit module=app status=error error={err}");
            eprintln!("jigyasa: {err}");
            ExitCode::FAILURE
        }
    }
}

fn promote_staff(config: &AppConfig, email: &str, is_staff: bool) -> Result<(), String> {
    let conn = open_db(&config.database_path).map_err(|err| format!("database open failed: {err}"))?;
    let auth = AuthService::new(
        SqliteAccountRepository::new(&conn),
        TokenPolicy::from_config(config),
    );
    let user_id = auth
        .set_staff(email, is_staff)
        .map_err(|err| err.to_string())?;
    info!("event=promote_staff module=app status=ok user_id={user_id} is_staff={is_staff}");
    println!("user {user_id} is_staff={is_staff}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::{CommandFactory, Parser};
    use std::path::PathBuf;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_flow_into_app_config() {
        let cli = Cli::try_parse_from([
            "jigyasa",
            "--database",
            "/tmp/surveys.sqlite3",
            "--bind",
            "0.0.0.0:9000",
            "--log-level",
            "warn",
            "--max-upload-bytes",
            "2048",
            "--report-font",
            "/usr/share/fonts/NotoSans.ttf",
        ])
        .unwrap();
        let config = cli.app_config();
        assert_eq!(config.database_path, PathBuf::from("/tmp/surveys.sqlite3"));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(
            config.report_font,
            Some(PathBuf::from("/usr/share/fonts/NotoSans.ttf"))
        );
        assert_eq!(config.validate().unwrap().port(), 9000);
        assert!(cli.command.is_none());
    }

    #[test]
    fn promote_staff_parses_email_and_revoke() {
        let cli =
            Cli::try_parse_from(["jigyasa", "promote-staff", "ada@example.com", "--revoke"]).unwrap();
        match cli.command {
            Some(Command::PromoteStaff { email, revoke }) => {
                assert_eq!(email, "ada@example.com");
                assert!(revoke);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
