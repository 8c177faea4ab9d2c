//! Survey response use-cases.
//!
//! # Responsibility
//! - Run the submission workflow: load survey, access check, validation,
//!   atomic persistence.
//! - Expose responses to their respondent and to survey managers.
//!
//! # Invariants
//! - Nothing is persisted unless access is granted and validation accepts.
//! - The respondent is taken from the trusted viewer, never from the payload.
//! - Logs carry ids and counts only, never answer content.

use crate::model::account::Viewer;
use crate::model::survey::{NewSubmission, ResponseId, SubmissionPayload, SurveyId, SurveyResponse};
use crate::policy::access::{can_access, can_manage, AccessDecision};
use crate::repo::response_repo::ResponseRepository;
use crate::repo::survey_repo::SurveyRepository;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::response_validator::{validate, ValidationOutcome};
use log::{error, info, warn};
use std::time::Instant;

pub const SUBMIT_CONFIRMATION: &str = "Response submitted successfully";

pub struct ResponseService<S: SurveyRepository, R: ResponseRepository> {
    surveys: S,
    responses: R,
}

impl<S: SurveyRepository, R: ResponseRepository> ResponseService<S, R> {
    pub fn new(surveys: S, responses: R) -> Self {
        Self { surveys, responses }
    }

    /// Validates and stores one submission.
    ///
    /// # Errors
    /// - `NotFound` when the survey is missing or tombstoned.
    /// - `Unauthenticated` / `Forbidden` from the access policy.
    /// - `ValidationFailed` with every field problem.
    /// - `BadRequest` when an answer references a foreign question or choice.
    /// - `IntegrityFailure` when persistence fails; nothing is written.
    pub fn submit(&self, viewer: &Viewer, payload: &SubmissionPayload) -> ServiceResult<ResponseId> {
        let started_at = Instant::now();
        let survey_id = payload.survey;

        let survey = self
            .surveys
            .get_survey(survey_id)?
            .ok_or_else(|| ServiceError::not_found("survey"))?;

        if let AccessDecision::Denied(reason) = can_access(viewer, &survey.survey) {
            info!(
                "event=response_submit module=service status=denied survey_id={survey_id} reason={reason:?}"
            );
            return Err(reason.into());
        }

        match validate(&survey, &payload.answers) {
            Ok(ValidationOutcome::Accepted) => {}
            Ok(ValidationOutcome::Rejected(errors)) => {
                info!(
                    "event=response_submit module=service status=rejected survey_id={survey_id} error_fields={}",
                    errors.len()
                );
                return Err(ServiceError::ValidationFailed(errors));
            }
            Err(abort) => {
                warn!(
                    "event=response_submit module=service status=rejected survey_id={survey_id} error={abort}"
                );
                return Err(ServiceError::BadRequest(abort.to_string()));
            }
        }

        let submission = NewSubmission::from_answers(&survey, viewer.user_id(), &payload.answers);
        match self.responses.create_response(&submission) {
            Ok(response_id) => {
                info!(
                    "event=response_submit module=service status=ok survey_id={survey_id} response_id={response_id} answers={} anonymous={} duration_ms={}",
                    submission.answers().len(),
                    submission.respondent_id().is_none(),
                    started_at.elapsed().as_millis()
                );
                Ok(response_id)
            }
            Err(err) => {
                error!(
                    "event=response_submit module=service status=error survey_id={survey_id} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(ServiceError::IntegrityFailure(err.to_string()))
            }
        }
    }

    /// Lists responses visible to `viewer`.
    ///
    /// With `survey_id`, returns every response of that survey to its
    /// managers. Without it, returns the viewer's own responses.
    pub fn list_responses(
        &self,
        viewer: &Viewer,
        survey_id: Option<SurveyId>,
    ) -> ServiceResult<Vec<SurveyResponse>> {
        let user = viewer
            .authenticated()
            .ok_or_else(ServiceError::unauthenticated)?;

        let Some(survey_id) = survey_id else {
            return Ok(self.responses.list_for_respondent(user.user_id)?);
        };

        let survey = self
            .surveys
            .get_survey(survey_id)?
            .ok_or_else(|| ServiceError::not_found("survey"))?;
        if !can_manage(viewer, &survey.survey) {
            return Err(ServiceError::Forbidden(
                "You do not have permission to view responses of this survey.".to_string(),
            ));
        }
        Ok(self.responses.list_for_survey(survey_id)?)
    }

    /// Returns one response to its respondent or a manager of its survey.
    pub fn get_response(
        &self,
        viewer: &Viewer,
        response_id: ResponseId,
    ) -> ServiceResult<SurveyResponse> {
        let user = viewer
            .authenticated()
            .ok_or_else(ServiceError::unauthenticated)?;
        let response = self
            .responses
            .get_response(response_id)?
            .ok_or_else(|| ServiceError::not_found("response"))?;

        if response.respondent_id == Some(user.user_id) {
            return Ok(response);
        }
        let managed = self
            .surveys
            .get_survey(response.survey_id)?
            .is_some_and(|survey| can_manage(viewer, &survey.survey));
        if managed {
            Ok(response)
        } else {
            Err(ServiceError::not_found("response"))
        }
    }
}
