//! Survey catalog use-cases and access-shaped views.
//!
//! # Responsibility
//! - Create, replace, patch and tombstone surveys for their managers.
//! - Produce the owner shape (managers) and the public shape (access policy).
//!
//! # Invariants
//! - The creator always comes from the authenticated viewer.
//! - Surveys outside the viewer's managed set read as `NotFound`.
//! - Questions and choices keep creation order in every view.

use crate::model::account::{OrganizationId, UserId, Viewer};
use crate::model::survey::{
    Question, SurveyDetail, SurveyDraft, SurveyId, SurveyPatch, SurveyValidationError,
};
use crate::policy::access::{can_access, can_manage, AccessDecision};
use crate::repo::survey_repo::{SurveyListQuery, SurveyRepository};
use crate::service::error::{ServiceError, ServiceResult};
use log::info;
use serde::Serialize;

/// Full survey as seen by its creator or staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerSurveyView {
    pub id: SurveyId,
    pub title: String,
    pub description: String,
    pub creator: UserId,
    pub organization: Option<OrganizationId>,
    pub is_active: bool,
    pub requires_organization: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub questions: Vec<Question>,
}

impl From<SurveyDetail> for OwnerSurveyView {
    fn from(value: SurveyDetail) -> Self {
        let SurveyDetail { survey, questions } = value;
        Self {
            id: survey.id,
            title: survey.title,
            description: survey.description,
            creator: survey.creator_id,
            organization: survey.organization_id,
            is_active: survey.is_active,
            requires_organization: survey.requires_organization,
            created_at: survey.created_at,
            updated_at: survey.updated_at,
            questions,
        }
    }
}

/// Respondent-facing survey shape; omits creator and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicSurveyView {
    pub id: SurveyId,
    pub title: String,
    pub description: String,
    pub is_active: bool,
    pub requires_organization: bool,
    pub questions: Vec<Question>,
}

impl From<SurveyDetail> for PublicSurveyView {
    fn from(value: SurveyDetail) -> Self {
        let SurveyDetail { survey, questions } = value;
        Self {
            id: survey.id,
            title: survey.title,
            description: survey.description,
            is_active: survey.is_active,
            requires_organization: survey.requires_organization,
            questions,
        }
    }
}

pub struct SurveyService<S: SurveyRepository> {
    repo: S,
}

impl<S: SurveyRepository> SurveyService<S> {
    pub fn new(repo: S) -> Self {
        Self { repo }
    }

    /// Staff see every survey; other users see the surveys they created.
    pub fn list_surveys(&self, viewer: &Viewer) -> ServiceResult<Vec<OwnerSurveyView>> {
        let user = viewer
            .authenticated()
            .ok_or_else(ServiceError::unauthenticated)?;
        let query = if user.is_staff {
            SurveyListQuery::default()
        } else {
            SurveyListQuery {
                creator_id: Some(user.user_id),
                ..SurveyListQuery::default()
            }
        };
        Ok(self
            .repo
            .list_surveys(&query)?
            .into_iter()
            .map(OwnerSurveyView::from)
            .collect())
    }

    pub fn create_survey(
        &self,
        viewer: &Viewer,
        draft: &SurveyDraft,
    ) -> ServiceResult<OwnerSurveyView> {
        let creator_id = viewer.user_id().ok_or_else(ServiceError::unauthenticated)?;
        draft.validate()?;
        let survey_id = self.repo.create_survey(creator_id, draft)?;
        info!(
            "event=survey_create module=service status=ok survey_id={survey_id} creator_id={creator_id} questions={}",
            draft.questions.as_ref().map_or(0, Vec::len)
        );
        self.owner_view(survey_id)
    }

    pub fn get_survey(&self, viewer: &Viewer, survey_id: SurveyId) -> ServiceResult<OwnerSurveyView> {
        Ok(self.load_managed(viewer, survey_id)?.into())
    }

    /// Replaces survey fields and, when `questions` is present, the whole
    /// question set. The question set is frozen once responses exist.
    pub fn update_survey(
        &self,
        viewer: &Viewer,
        survey_id: SurveyId,
        draft: &SurveyDraft,
    ) -> ServiceResult<OwnerSurveyView> {
        let current = self.load_managed(viewer, survey_id)?;
        draft.validate()?;

        if draft.questions.is_some() && self.repo.count_responses(survey_id)? > 0 {
            return Err(ServiceError::BadRequest(
                "Questions cannot be replaced after responses have been submitted.".to_string(),
            ));
        }

        let mut survey = current.survey;
        survey.title = draft.title.clone();
        survey.description = draft.description.clone();
        survey.is_active = draft.is_active;
        survey.requires_organization = draft.requires_organization;
        survey.organization_id = draft.organization_id;
        self.repo
            .update_survey(&survey, draft.questions.as_deref())?;
        info!(
            "event=survey_update module=service status=ok survey_id={survey_id} replaced_questions={}",
            draft.questions.is_some()
        );
        self.owner_view(survey_id)
    }

    pub fn patch_survey(
        &self,
        viewer: &Viewer,
        survey_id: SurveyId,
        patch: &SurveyPatch,
    ) -> ServiceResult<OwnerSurveyView> {
        let current = self.load_managed(viewer, survey_id)?;
        let patched = patch.apply_to(&current.survey);
        if patched.title.trim().is_empty() {
            return Err(SurveyValidationError::EmptyTitle.into());
        }
        if patched.requires_organization && patched.organization_id.is_none() {
            return Err(SurveyValidationError::MissingOrganization.into());
        }
        self.repo.update_survey(&patched, None)?;
        info!("event=survey_patch module=service status=ok survey_id={survey_id}");
        self.owner_view(survey_id)
    }

    pub fn delete_survey(&self, viewer: &Viewer, survey_id: SurveyId) -> ServiceResult<()> {
        self.load_managed(viewer, survey_id)?;
        self.repo.tombstone_survey(survey_id)?;
        info!("event=survey_delete module=service status=ok survey_id={survey_id}");
        Ok(())
    }

    /// Public shape gated by the access policy.
    pub fn public_survey(
        &self,
        viewer: &Viewer,
        survey_id: SurveyId,
    ) -> ServiceResult<PublicSurveyView> {
        let survey = self.load_accessible(viewer, survey_id)?;
        Ok(survey.into())
    }

    /// Public shape addressed by creator and survey id.
    pub fn creator_survey(
        &self,
        viewer: &Viewer,
        creator_id: UserId,
        survey_id: SurveyId,
    ) -> ServiceResult<PublicSurveyView> {
        let survey = self
            .repo
            .get_survey(survey_id)?
            .filter(|survey| survey.survey.creator_id == creator_id)
            .ok_or_else(|| ServiceError::not_found("survey"))?;
        if let AccessDecision::Denied(reason) = can_access(viewer, &survey.survey) {
            return Err(reason.into());
        }
        Ok(survey.into())
    }

    /// Surveys of the viewer's organization created by other members.
    pub fn organization_surveys(&self, viewer: &Viewer) -> ServiceResult<Vec<OwnerSurveyView>> {
        let user = viewer
            .authenticated()
            .ok_or_else(ServiceError::unauthenticated)?;
        let organization_id = user.organization_id.ok_or_else(|| {
            ServiceError::BadRequest("User is not associated with any organization.".to_string())
        })?;
        let query = SurveyListQuery {
            organization_id: Some(organization_id),
            exclude_creator_id: Some(user.user_id),
            ..SurveyListQuery::default()
        };
        Ok(self
            .repo
            .list_surveys(&query)?
            .into_iter()
            .map(OwnerSurveyView::from)
            .collect())
    }

    fn load_managed(&self, viewer: &Viewer, survey_id: SurveyId) -> ServiceResult<SurveyDetail> {
        if !viewer.is_authenticated() {
            return Err(ServiceError::unauthenticated());
        }
        self.repo
            .get_survey(survey_id)?
            .filter(|survey| can_manage(viewer, &survey.survey))
            .ok_or_else(|| ServiceError::not_found("survey"))
    }

    fn load_accessible(&self, viewer: &Viewer, survey_id: SurveyId) -> ServiceResult<SurveyDetail> {
        let survey = self
            .repo
            .get_survey(survey_id)?
            .ok_or_else(|| ServiceError::not_found("survey"))?;
        match can_access(viewer, &survey.survey) {
            AccessDecision::Granted => Ok(survey),
            AccessDecision::Denied(reason) => Err(reason.into()),
        }
    }

    fn owner_view(&self, survey_id: SurveyId) -> ServiceResult<OwnerSurveyView> {
        self.repo
            .get_survey(survey_id)?
            .map(OwnerSurveyView::from)
            .ok_or_else(|| {
                ServiceError::IntegrityFailure(format!(
                    "survey {survey_id} not found in read-back"
                ))
            })
    }
}
