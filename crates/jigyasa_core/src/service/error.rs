//! Service-boundary error taxonomy.
//!
//! # Responsibility
//! - Translate repository, validation and policy failures into the fixed set
//!   of caller-facing error classes.
//!
//! # Invariants
//! - `IntegrityFailure` carries internal detail for logs only; transports
//!   must answer with a generic message.

use crate::analytics::AnalyticsError;
use crate::model::account::AccountValidationError;
use crate::model::analysis::AnalysisValidationError;
use crate::model::survey::SurveyValidationError;
use crate::policy::access::DenialReason;
use crate::report::ReportError;
use crate::repo::RepoError;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Field-keyed validation messages, e.g. `question_12 -> "This field is required"`.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug)]
pub enum ServiceError {
    NotFound(String),
    Unauthenticated(String),
    Forbidden(String),
    ValidationFailed(FieldErrors),
    BadRequest(String),
    /// Unique key already taken.
    Conflict(String),
    /// Storage or rendering failure that must not leak to callers.
    IntegrityFailure(String),
}

impl ServiceError {
    pub fn not_found(entity: &str) -> Self {
        Self::NotFound(format!("{} not found", capitalize(entity)))
    }

    pub fn unauthenticated() -> Self {
        Self::Unauthenticated("Authentication credentials were not provided.".to_string())
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::Unauthenticated(message) => write!(f, "unauthenticated: {message}"),
            Self::Forbidden(message) => write!(f, "forbidden: {message}"),
            Self::ValidationFailed(fields) => {
                write!(f, "validation failed for {} field(s)", fields.len())
            }
            Self::BadRequest(message) => write!(f, "bad request: {message}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::IntegrityFailure(message) => write!(f, "integrity failure: {message}"),
        }
    }
}

impl Error for ServiceError {}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, .. } => Self::not_found(entity),
            RepoError::Conflict(message) => Self::Conflict(message),
            other => Self::IntegrityFailure(other.to_string()),
        }
    }
}

impl From<DenialReason> for ServiceError {
    fn from(value: DenialReason) -> Self {
        match value {
            DenialReason::Unauthenticated => Self::Unauthenticated(value.message().to_string()),
            DenialReason::Forbidden => Self::Forbidden(value.message().to_string()),
        }
    }
}

impl From<AccountValidationError> for ServiceError {
    fn from(value: AccountValidationError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<SurveyValidationError> for ServiceError {
    fn from(value: SurveyValidationError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<AnalysisValidationError> for ServiceError {
    fn from(value: AnalysisValidationError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<AnalyticsError> for ServiceError {
    fn from(value: AnalyticsError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<ReportError> for ServiceError {
    fn from(value: ReportError) -> Self {
        Self::IntegrityFailure(value.to_string())
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceError;
    use crate::policy::access::DenialReason;
    use crate::repo::RepoError;

    #[test]
    fn repo_not_found_becomes_capitalized_message() {
        let err = ServiceError::from(RepoError::NotFound {
            entity: "survey",
            id: 4,
        });
        assert!(matches!(err, ServiceError::NotFound(ref message) if message == "Survey not found"));
    }

    #[test]
    fn invalid_data_is_an_integrity_failure() {
        let err = ServiceError::from(RepoError::InvalidData("bad flag".to_string()));
        assert!(matches!(err, ServiceError::IntegrityFailure(_)));
    }

    #[test]
    fn denial_reasons_map_to_auth_classes() {
        assert!(matches!(
            ServiceError::from(DenialReason::Unauthenticated),
            ServiceError::Unauthenticated(_)
        ));
        assert!(matches!(
            ServiceError::from(DenialReason::Forbidden),
            ServiceError::Forbidden(_)
        ));
    }
}
