//! Organization use-cases.
//!
//! Listing is open; reading and creating need an authenticated viewer;
//! updating and deleting are reserved to staff.

use crate::model::account::{Organization, OrganizationDraft, OrganizationId, Viewer};
use crate::repo::organization_repo::OrganizationRepository;
use crate::service::error::{ServiceError, ServiceResult};
use log::info;

pub struct OrganizationService<O: OrganizationRepository> {
    repo: O,
}

impl<O: OrganizationRepository> OrganizationService<O> {
    pub fn new(repo: O) -> Self {
        Self { repo }
    }

    pub fn list(&self) -> ServiceResult<Vec<Organization>> {
        Ok(self.repo.list_organizations()?)
    }

    pub fn create(&self, viewer: &Viewer, draft: &OrganizationDraft) -> ServiceResult<Organization> {
        if !viewer.is_authenticated() {
            return Err(ServiceError::unauthenticated());
        }
        draft.validate()?;
        let organization = self.repo.create_organization(draft)?;
        info!(
            "event=organization_create module=service status=ok organization_id={}",
            organization.id
        );
        Ok(organization)
    }

    pub fn get(&self, viewer: &Viewer, id: OrganizationId) -> ServiceResult<Organization> {
        if !viewer.is_authenticated() {
            return Err(ServiceError::unauthenticated());
        }
        self.repo
            .get_organization(id)?
            .ok_or_else(|| ServiceError::not_found("organization"))
    }

    pub fn update(
        &self,
        viewer: &Viewer,
        id: OrganizationId,
        draft: &OrganizationDraft,
    ) -> ServiceResult<Organization> {
        require_staff(viewer)?;
        draft.validate()?;
        let organization = self.repo.update_organization(id, draft)?;
        info!("event=organization_update module=service status=ok organization_id={id}");
        Ok(organization)
    }

    /// Deletes an organization; profiles and surveys scoped to it are cleared.
    pub fn delete(&self, viewer: &Viewer, id: OrganizationId) -> ServiceResult<()> {
        require_staff(viewer)?;
        self.repo.delete_organization(id)?;
        info!("event=organization_delete module=service status=ok organization_id={id}");
        Ok(())
    }
}

fn require_staff(viewer: &Viewer) -> ServiceResult<()> {
    match viewer.authenticated() {
        None => Err(ServiceError::unauthenticated()),
        Some(user) if user.is_staff => Ok(()),
        Some(_) => Err(ServiceError::Forbidden(
            "You do not have permission to perform this action.".to_string(),
        )),
    }
}
