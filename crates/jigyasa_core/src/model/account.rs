//! Account domain model: users, profiles, organizations and request viewers.
//!
//! # Invariants
//! - `email` is unique case-insensitively; `username` is unique.
//! - A profile row exists for every user and is created with it.
//! - Password material never leaves the repository layer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type UserId = i64;
pub type OrganizationId = i64;

const MIN_PASSWORD_CHARS: usize = 8;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Registered user as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Group of users that can share organization-restricted surveys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub description: String,
    pub created_at: i64,
}

/// Per-user profile carrying the organization membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub organization: Option<Organization>,
    pub bio: String,
}

/// Identity resolved for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(AuthenticatedUser),
}

/// Trusted context for an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub is_staff: bool,
    /// Organization from the user's profile, if any.
    pub organization_id: Option<OrganizationId>,
}

impl Viewer {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user.user_id),
        }
    }

    pub fn authenticated(&self) -> Option<&AuthenticatedUser> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }
}

/// Bearer token kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Confirmation copy of `password`; checked only when present.
    #[serde(default)]
    pub password2: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl Registration {
    /// Validates registration fields before any persistence.
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        if self.username.trim().is_empty() {
            return Err(AccountValidationError::EmptyUsername);
        }
        if !EMAIL_RE.is_match(self.email.trim()) {
            return Err(AccountValidationError::InvalidEmail(self.email.clone()));
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AccountValidationError::PasswordTooShort {
                min_chars: MIN_PASSWORD_CHARS,
            });
        }
        if let Some(confirmation) = self.password2.as_deref() {
            if confirmation != self.password {
                return Err(AccountValidationError::PasswordMismatch);
            }
        }
        Ok(())
    }
}

/// Profile update payload. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    /// `null` clears the membership.
    #[serde(default, deserialize_with = "super::explicit_null")]
    pub organization_id: Option<Option<OrganizationId>>,
}

/// Organization create/update payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrganizationDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl OrganizationDraft {
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        if self.name.trim().is_empty() {
            return Err(AccountValidationError::EmptyOrganizationName);
        }
        Ok(())
    }
}

/// Validation errors for account and organization payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountValidationError {
    EmptyUsername,
    InvalidEmail(String),
    PasswordTooShort { min_chars: usize },
    PasswordMismatch,
    EmptyOrganizationName,
}

impl Display for AccountValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUsername => write!(f, "username must not be empty"),
            Self::InvalidEmail(value) => write!(f, "invalid email address: `{value}`"),
            Self::PasswordTooShort { min_chars } => {
                write!(f, "password must be at least {min_chars} characters")
            }
            Self::PasswordMismatch => write!(f, "password fields didn't match"),
            Self::EmptyOrganizationName => write!(f, "organization name must not be empty"),
        }
    }
}

impl Error for AccountValidationError {}

#[cfg(test)]
mod tests {
    use super::{AccountValidationError, Registration};

    fn registration() -> Registration {
        Registration {
            username: "asha".to_string(),
            email: "asha@example.com".to_string(),
            password: "correct horse".to_string(),
            password2: None,
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[test]
    fn registration_accepts_well_formed_input() {
        assert!(registration().validate().is_ok());
    }

    #[test]
    fn registration_rejects_bad_email_and_short_password() {
        let mut bad_email = registration();
        bad_email.email = "not-an-email".to_string();
        assert!(matches!(
            bad_email.validate(),
            Err(AccountValidationError::InvalidEmail(_))
        ));

        let mut short = registration();
        short.password = "short".to_string();
        assert_eq!(
            short.validate(),
            Err(AccountValidationError::PasswordTooShort { min_chars: 8 })
        );
    }

    #[test]
    fn registration_checks_confirmation_only_when_present() {
        let mut mismatch = registration();
        mismatch.password2 = Some("something else".to_string());
        assert_eq!(
            mismatch.validate(),
            Err(AccountValidationError::PasswordMismatch)
        );
    }
}
