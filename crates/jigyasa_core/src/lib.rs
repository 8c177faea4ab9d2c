//! Survey management and CSV analytics core for Jigyasa.
//!
//! # Responsibility
//! - Own the schema, repositories and use-case services.
//! - Decide access, validate answers and build chart documents.
//!
//! Transport crates call into `service` and map `ServiceError`; no business
//! rule lives outside this crate.

pub mod analytics;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod policy;
pub mod report;
pub mod repo;
pub mod service;

pub use config::{AppConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{active_settings, default_log_level, init_logging, LogSettings, LoggingError};
pub use model::account::{AuthenticatedUser, UserId, Viewer};
pub use model::survey::{SubmissionPayload, SurveyId};
pub use policy::access::{can_access, can_manage, AccessDecision, DenialReason};
pub use report::{PdfReportRenderer, ReportRenderer};
pub use repo::{RepoError, RepoResult};
pub use service::error::{FieldErrors, ServiceError, ServiceResult};

/// Version reported by the health endpoint.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
