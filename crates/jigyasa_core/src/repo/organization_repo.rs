//! Organization persistence.

use crate::model::account::{Organization, OrganizationDraft, OrganizationId};
use crate::repo::{conflict_on_unique, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const ORGANIZATION_SELECT_SQL: &str = "SELECT id, name, description, created_at FROM organizations";

pub trait OrganizationRepository {
    fn create_organization(&self, draft: &OrganizationDraft) -> RepoResult<Organization>;
    fn get_organization(&self, id: OrganizationId) -> RepoResult<Option<Organization>>;
    /// Lists organizations ordered by name.
    fn list_organizations(&self) -> RepoResult<Vec<Organization>>;
    fn update_organization(
        &self,
        id: OrganizationId,
        draft: &OrganizationDraft,
    ) -> RepoResult<Organization>;
    /// Deletes one organization; memberships and survey scopes are cleared.
    fn delete_organization(&self, id: OrganizationId) -> RepoResult<()>;
}

pub struct SqliteOrganizationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteOrganizationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl OrganizationRepository for SqliteOrganizationRepository<'_> {
    fn create_organization(&self, draft: &OrganizationDraft) -> RepoResult<Organization> {
        self.conn
            .execute(
                "INSERT INTO organizations (name, description) VALUES (?1, ?2);",
                params![draft.name.trim(), draft.description.as_str()],
            )
            .map_err(|err| conflict_on_unique(err, duplicate_name_message(&draft.name)))?;
        let id = self.conn.last_insert_rowid();
        self.get_organization(id)?.ok_or(RepoError::NotFound {
            entity: "organization",
            id,
        })
    }

    fn get_organization(&self, id: OrganizationId) -> RepoResult<Option<Organization>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ORGANIZATION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_organization_row(row)?));
        }
        Ok(None)
    }

    fn list_organizations(&self) -> RepoResult<Vec<Organization>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ORGANIZATION_SELECT_SQL} ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut organizations = Vec::new();
        while let Some(row) = rows.next()? {
            organizations.push(parse_organization_row(row)?);
        }
        Ok(organizations)
    }

    fn update_organization(
        &self,
        id: OrganizationId,
        draft: &OrganizationDraft,
    ) -> RepoResult<Organization> {
        let changed = self
            .conn
            .execute(
                "UPDATE organizations SET name = ?2, description = ?3 WHERE id = ?1;",
                params![id, draft.name.trim(), draft.description.as_str()],
            )
            .map_err(|err| conflict_on_unique(err, duplicate_name_message(&draft.name)))?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "organization",
                id,
            });
        }
        self.get_organization(id)?.ok_or(RepoError::NotFound {
            entity: "organization",
            id,
        })
    }

    fn delete_organization(&self, id: OrganizationId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM organizations WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "organization",
                id,
            });
        }
        Ok(())
    }
}

fn duplicate_name_message(name: &str) -> String {
    format!("organization `{}` already exists", name.trim())
}

fn parse_organization_row(row: &Row<'_>) -> RepoResult<Organization> {
    Ok(Organization {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) fn organization_exists(conn: &Connection, id: OrganizationId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM organizations WHERE id = ?1);",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
