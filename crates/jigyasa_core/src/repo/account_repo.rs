//! User, profile and bearer-token persistence.
//!
//! # Invariants
//! - A user row and its profile row are created in one transaction.
//! - Token lookups never return expired tokens.

use crate::model::account::{
    Organization, OrganizationId, ProfileUpdate, Registration, TokenKind, User, UserId,
    UserProfile,
};
use crate::repo::organization_repo::organization_exists;
use crate::repo::{bool_to_int, conflict_on_unique, int_to_bool, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const USER_SELECT_SQL: &str = "SELECT
    id,
    username,
    email,
    first_name,
    last_name,
    is_staff,
    created_at
FROM users";

/// Stored password material for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    pub user: User,
    /// PHC-formatted hash.
    pub password_hash: String,
}

/// Repository interface for accounts and tokens.
pub trait AccountRepository {
    /// Creates a user plus an empty profile.
    fn create_user(&self, registration: &Registration, password_hash: &str) -> RepoResult<User>;
    fn get_user(&self, user_id: UserId) -> RepoResult<Option<User>>;
    fn find_credentials_by_email(&self, email: &str) -> RepoResult<Option<StoredCredentials>>;
    fn find_user_id_by_email(&self, email: &str) -> RepoResult<Option<UserId>>;
    fn set_staff(&self, user_id: UserId, is_staff: bool) -> RepoResult<()>;
    fn get_profile(&self, user_id: UserId) -> RepoResult<Option<UserProfile>>;
    fn update_profile(&self, user_id: UserId, update: &ProfileUpdate) -> RepoResult<()>;
    fn insert_token(
        &self,
        token: &str,
        user_id: UserId,
        kind: TokenKind,
        expires_at: i64,
    ) -> RepoResult<()>;
    /// Returns the owner of an unexpired token of the given kind.
    fn resolve_token(&self, token: &str, kind: TokenKind, now_ms: i64)
        -> RepoResult<Option<UserId>>;
    /// Removes expired tokens and returns how many were deleted.
    fn purge_expired_tokens(&self, now_ms: i64) -> RepoResult<usize>;
}

/// SQLite-backed account repository.
pub struct SqliteAccountRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAccountRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AccountRepository for SqliteAccountRepository<'_> {
    fn create_user(&self, registration: &Registration, password_hash: &str) -> RepoResult<User> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO users (
                username,
                email,
                password_hash,
                first_name,
                last_name
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                registration.username.trim(),
                registration.email.trim(),
                password_hash,
                registration.first_name.trim(),
                registration.last_name.trim(),
            ],
        )
        .map_err(|err| conflict_on_unique(err, "a user with that username or email already exists"))?;
        let user_id = tx.last_insert_rowid();
        tx.execute("INSERT INTO user_profiles (user_id) VALUES (?1);", [user_id])?;
        let user = load_user(&tx, user_id)?.ok_or(RepoError::NotFound {
            entity: "user",
            id: user_id,
        })?;
        tx.commit()?;
        Ok(user)
    }

    fn get_user(&self, user_id: UserId) -> RepoResult<Option<User>> {
        load_user(self.conn, user_id)
    }

    fn find_credentials_by_email(&self, email: &str) -> RepoResult<Option<StoredCredentials>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                username,
                email,
                first_name,
                last_name,
                is_staff,
                created_at,
                password_hash
             FROM users
             WHERE email = ?1 COLLATE NOCASE;",
        )?;
        let mut rows = stmt.query([email.trim()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(StoredCredentials {
                user: parse_user_row(row)?,
                password_hash: row.get("password_hash")?,
            }));
        }
        Ok(None)
    }

    fn find_user_id_by_email(&self, email: &str) -> RepoResult<Option<UserId>> {
        let user_id = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1 COLLATE NOCASE;",
                [email.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(user_id)
    }

    fn set_staff(&self, user_id: UserId, is_staff: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users SET is_staff = ?1 WHERE id = ?2;",
            params![bool_to_int(is_staff), user_id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "user",
                id: user_id,
            });
        }
        Ok(())
    }

    fn get_profile(&self, user_id: UserId) -> RepoResult<Option<UserProfile>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                p.user_id,
                p.bio,
                o.id AS organization_id,
                o.name AS organization_name,
                o.description AS organization_description,
                o.created_at AS organization_created_at
             FROM user_profiles p
             LEFT JOIN organizations o ON o.id = p.organization_id
             WHERE p.user_id = ?1;",
        )?;
        let mut rows = stmt.query([user_id])?;
        if let Some(row) = rows.next()? {
            let organization = match row.get::<_, Option<OrganizationId>>("organization_id")? {
                Some(id) => Some(Organization {
                    id,
                    name: row.get("organization_name")?,
                    description: row.get("organization_description")?,
                    created_at: row.get("organization_created_at")?,
                }),
                None => None,
            };
            return Ok(Some(UserProfile {
                user_id: row.get("user_id")?,
                organization,
                bio: row.get("bio")?,
            }));
        }
        Ok(None)
    }

    fn update_profile(&self, user_id: UserId, update: &ProfileUpdate) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE users
             SET
                first_name = COALESCE(?2, first_name),
                last_name = COALESCE(?3, last_name)
             WHERE id = ?1;",
            params![
                user_id,
                update.first_name.as_deref().map(str::trim),
                update.last_name.as_deref().map(str::trim),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "user",
                id: user_id,
            });
        }

        if let Some(bio) = update.bio.as_deref() {
            tx.execute(
                "UPDATE user_profiles SET bio = ?2 WHERE user_id = ?1;",
                params![user_id, bio],
            )?;
        }
        if let Some(organization_id) = update.organization_id {
            if let Some(id) = organization_id {
                if !organization_exists(&tx, id)? {
                    return Err(RepoError::NotFound {
                        entity: "organization",
                        id,
                    });
                }
            }
            tx.execute(
                "UPDATE user_profiles SET organization_id = ?2 WHERE user_id = ?1;",
                params![user_id, organization_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn insert_token(
        &self,
        token: &str,
        user_id: UserId,
        kind: TokenKind,
        expires_at: i64,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO auth_tokens (token, user_id, kind, expires_at) VALUES (?1, ?2, ?3, ?4);",
            params![token, user_id, kind.as_str(), expires_at],
        )?;
        Ok(())
    }

    fn resolve_token(
        &self,
        token: &str,
        kind: TokenKind,
        now_ms: i64,
    ) -> RepoResult<Option<UserId>> {
        let user_id = self
            .conn
            .query_row(
                "SELECT user_id
                 FROM auth_tokens
                 WHERE token = ?1
                   AND kind = ?2
                   AND expires_at > ?3;",
                params![token, kind.as_str(), now_ms],
                |row| row.get(0),
            )
            .optional()?;
        Ok(user_id)
    }

    fn purge_expired_tokens(&self, now_ms: i64) -> RepoResult<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM auth_tokens WHERE expires_at <= ?1;", [now_ms])?;
        Ok(deleted)
    }
}

fn load_user(conn: &Connection, user_id: UserId) -> RepoResult<Option<User>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([user_id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_user_row(row)?));
    }
    Ok(None)
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        is_staff: int_to_bool(row.get("is_staff")?, "users.is_staff")?,
        created_at: row.get("created_at")?,
    })
}
