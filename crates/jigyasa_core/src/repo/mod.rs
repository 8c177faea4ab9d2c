//! Repository layer: SQLite persistence behind use-case oriented traits.
//!
//! # Responsibility
//! - Keep SQL details inside the core persistence boundary.
//! - Return semantic errors (`NotFound`, `Conflict`) in addition to DB
//!   transport errors.
//!
//! # Invariants
//! - Multi-row writes (user + profile, survey + questions + choices,
//!   response + answers) run inside one `IMMEDIATE` transaction.
//! - Child rows are always read in ascending id (insertion) order.

pub mod account_repo;
pub mod analysis_repo;
pub mod organization_repo;
pub mod response_repo;
pub mod survey_repo;

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by all SQLite repositories.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, id: i64 },
    /// Unique constraint violated; carries a caller-facing description.
    Conflict(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "{message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::Conflict(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Maps unique-constraint failures to `Conflict`, passing other errors on.
pub(crate) fn conflict_on_unique(err: rusqlite::Error, message: impl Into<String>) -> RepoError {
    let err = DbError::Sqlite(err);
    if err.is_unique_violation() {
        RepoError::Conflict(message.into())
    } else {
        RepoError::Db(err)
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
