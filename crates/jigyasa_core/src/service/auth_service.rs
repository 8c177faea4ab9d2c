//! Account, credential and bearer-token use-cases.
//!
//! # Responsibility
//! - Register users with Argon2id password hashes.
//! - Issue and resolve opaque access/refresh tokens.
//! - Resolve the request viewer and serve the caller's profile.
//!
//! # Invariants
//! - Passwords are stored as Argon2id PHC strings and checked with the
//!   hasher's own constant-time verify.
//! - Bearer tokens are stored as hex SHA-256 digests; the raw token only
//!   leaves this module in a login or refresh result.
//! - An unknown or expired bearer token is an authentication failure, never
//!   a silent downgrade to anonymous.

use crate::config::AppConfig;
use crate::model::account::{
    AuthenticatedUser, OrganizationId, ProfileUpdate, Registration, TokenKind, User, UserId,
    Viewer,
};
use crate::repo::account_repo::AccountRepository;
use crate::service::error::{ServiceError, ServiceResult};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use log::{error, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Token lifetimes in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub access_ttl_ms: i64,
    pub refresh_ttl_ms: i64,
}

impl TokenPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            access_ttl_ms: secs_to_ms(config.access_token_ttl_secs),
            refresh_ttl_ms: secs_to_ms(config.refresh_token_ttl_secs),
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Token pair returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginResult {
    pub refresh: String,
    pub access: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationRef {
    pub id: OrganizationId,
    pub name: String,
}

/// Profile as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub bio: String,
    pub organization: Option<OrganizationRef>,
}

pub struct AuthService<A: AccountRepository> {
    repo: A,
    tokens: TokenPolicy,
}

impl<A: AccountRepository> AuthService<A> {
    pub fn new(repo: A, tokens: TokenPolicy) -> Self {
        Self { repo, tokens }
    }

    pub fn register(&self, registration: &Registration) -> ServiceResult<User> {
        registration.validate()?;
        let password_hash = hash_password(&registration.password)?;
        let user = self.repo.create_user(registration, &password_hash)?;
        info!(
            "event=user_register module=auth status=ok user_id={}",
            user.id
        );
        Ok(user)
    }

    /// Checks credentials and issues a fresh token pair.
    pub fn login(&self, email: &str, password: &str) -> ServiceResult<LoginResult> {
        let Some(credentials) = self.repo.find_credentials_by_email(email)? else {
            info!("event=user_login module=auth status=error reason=unknown_email");
            return Err(ServiceError::NotFound("User does not exist".to_string()));
        };
        if !verify_password(password, &credentials.password_hash) {
            info!(
                "event=user_login module=auth status=error reason=bad_password user_id={}",
                credentials.user.id
            );
            return Err(ServiceError::Unauthenticated(
                "Invalid credentials".to_string(),
            ));
        }

        let now = now_ms();
        let purged = self.repo.purge_expired_tokens(now)?;
        let user_id = credentials.user.id;
        let access = self.issue(user_id, TokenKind::Access, now)?;
        let refresh = self.issue(user_id, TokenKind::Refresh, now)?;
        info!("event=user_login module=auth status=ok user_id={user_id} purged_tokens={purged}");
        Ok(LoginResult {
            refresh,
            access,
            user: credentials.user,
        })
    }

    /// Exchanges a valid refresh token for a new access token.
    pub fn refresh(&self, refresh_token: &str) -> ServiceResult<String> {
        let now = now_ms();
        let user_id = self
            .repo
            .resolve_token(&token_digest(refresh_token.trim()), TokenKind::Refresh, now)?
            .ok_or_else(|| {
                ServiceError::Unauthenticated("Token is invalid or expired".to_string())
            })?;
        self.issue(user_id, TokenKind::Access, now)
    }

    /// Resolves the request identity from an optional bearer token.
    pub fn resolve_viewer(&self, bearer: Option<&str>) -> ServiceResult<Viewer> {
        let Some(token) = bearer.map(str::trim).filter(|token| !token.is_empty()) else {
            return Ok(Viewer::Anonymous);
        };
        let Some(user_id) = self
            .repo
            .resolve_token(&token_digest(token), TokenKind::Access, now_ms())?
        else {
            warn!("event=auth_resolve module=auth status=error reason=invalid_token");
            return Err(ServiceError::Unauthenticated(
                "Given token not valid for any token type".to_string(),
            ));
        };
        self.viewer_for(user_id)
    }

    /// Builds the trusted viewer for a known user id.
    pub fn viewer_for(&self, user_id: UserId) -> ServiceResult<Viewer> {
        let user = self
            .repo
            .get_user(user_id)?
            .ok_or_else(|| ServiceError::Unauthenticated("User not found".to_string()))?;
        let organization_id = self
            .repo
            .get_profile(user_id)?
            .and_then(|profile| profile.organization)
            .map(|organization| organization.id);
        Ok(Viewer::User(AuthenticatedUser {
            user_id,
            is_staff: user.is_staff,
            organization_id,
        }))
    }

    pub fn profile(&self, viewer: &Viewer) -> ServiceResult<ProfileView> {
        let user_id = viewer.user_id().ok_or_else(ServiceError::unauthenticated)?;
        self.load_profile(user_id)
    }

    pub fn update_profile(
        &self,
        viewer: &Viewer,
        update: &ProfileUpdate,
    ) -> ServiceResult<ProfileView> {
        let user_id = viewer.user_id().ok_or_else(ServiceError::unauthenticated)?;
        self.repo.update_profile(user_id, update)?;
        info!("event=profile_update module=auth status=ok user_id={user_id}");
        self.load_profile(user_id)
    }

    /// Grants or revokes the staff flag. Used by operator tooling.
    pub fn set_staff(&self, email: &str, is_staff: bool) -> ServiceResult<UserId> {
        let user_id = self
            .repo
            .find_user_id_by_email(email)?
            .ok_or_else(|| ServiceError::NotFound("User does not exist".to_string()))?;
        self.repo.set_staff(user_id, is_staff)?;
        info!("event=user_set_staff module=auth status=ok user_id={user_id} is_staff={is_staff}");
        Ok(user_id)
    }

    fn load_profile(&self, user_id: UserId) -> ServiceResult<ProfileView> {
        let user = self
            .repo
            .get_user(user_id)?
            .ok_or_else(|| ServiceError::not_found("user"))?;
        let profile = self
            .repo
            .get_profile(user_id)?
            .ok_or_else(|| ServiceError::IntegrityFailure(format!("missing profile for user {user_id}")))?;
        Ok(ProfileView {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
            bio: profile.bio,
            organization: profile.organization.map(|organization| OrganizationRef {
                id: organization.id,
                name: organization.name,
            }),
        })
    }

    fn issue(&self, user_id: UserId, kind: TokenKind, now: i64) -> ServiceResult<String> {
        let ttl = match kind {
            TokenKind::Access => self.tokens.access_ttl_ms,
            TokenKind::Refresh => self.tokens.refresh_ttl_ms,
        };
        let token = new_token();
        self.repo
            .insert_token(&token_digest(&token), user_id, kind, now.saturating_add(ttl))?;
        Ok(token)
    }
}

/// Argon2id PHC string for `password` with a fresh random salt.
pub fn hash_password(password: &str) -> ServiceResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| {
            error!("event=password_hash module=auth status=error error={err}");
            ServiceError::IntegrityFailure(format!("password hashing failed: {err}"))
        })
}

/// False for a wrong password and for a stored value that is not a PHC string.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!("event=password_verify module=auth status=error reason=malformed_hash error={err}");
            false
        }
    }
}

/// Storage key for a bearer token.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX / 1000).saturating_mul(1000)
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{hash_password, new_token, token_digest, verify_password};

    #[test]
    fn password_hashes_are_salted_argon2id_phc_strings() {
        let first = hash_password("correct horse").unwrap();
        let second = hash_password("correct horse").unwrap();
        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);

        assert!(verify_password("correct horse", &first));
        assert!(verify_password("correct horse", &second));
        assert!(!verify_password("battery staple", &first));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "5e884898da28047151d0e56f8dc6292773603d0d"));
    }

    #[test]
    fn tokens_are_unique_hex_and_stored_as_digests() {
        let token = new_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, new_token());

        let digest = token_digest(&token);
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, token);
        assert_eq!(digest, token_digest(&token));
    }
}
