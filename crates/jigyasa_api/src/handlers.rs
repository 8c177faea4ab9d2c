//! One handler per route-table operation.
//!
//! Handlers decode the request, call exactly one service use-case and pick
//! the success status. Every failure leaves as `ServiceError`.

use crate::envelope::{ApiRequest, ApiResponse};
use crate::routes::{Operation, RouteMatch};
use jigyasa_core::model::account::{OrganizationDraft, ProfileUpdate, Registration, Viewer};
use jigyasa_core::model::analysis::{AnalysisDraft, AnalysisId, GroupByRequest, PlotRequest};
use jigyasa_core::model::survey::{SubmissionPayload, SurveyDraft, SurveyPatch};
use jigyasa_core::repo::account_repo::SqliteAccountRepository;
use jigyasa_core::repo::analysis_repo::SqliteAnalysisRepository;
use jigyasa_core::repo::organization_repo::SqliteOrganizationRepository;
use jigyasa_core::repo::response_repo::SqliteResponseRepository;
use jigyasa_core::repo::survey_repo::SqliteSurveyRepository;
use jigyasa_core::service::analyzer_service::AnalyzerService;
use jigyasa_core::service::auth_service::{AuthService, TokenPolicy};
use jigyasa_core::service::organization_service::OrganizationService;
use jigyasa_core::service::response_service::{ResponseService, SUBMIT_CONFIRMATION};
use jigyasa_core::service::survey_service::SurveyService;
use jigyasa_core::{AppConfig, PdfReportRenderer, ServiceError, ServiceResult};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    refresh: String,
}

#[derive(Debug, Deserialize)]
struct PublishPayload {
    analysis_id: AnalysisId,
}

/// Per-request handler state.
pub(crate) struct Context<'a> {
    pub conn: &'a Connection,
    pub config: &'a AppConfig,
    pub tokens: TokenPolicy,
    pub renderer: &'a PdfReportRenderer,
    pub viewer: Viewer,
}

impl<'a> Context<'a> {
    pub(crate) fn auth(&self) -> AuthService<SqliteAccountRepository<'a>> {
        AuthService::new(SqliteAccountRepository::new(self.conn), self.tokens)
    }

    fn organizations(&self) -> OrganizationService<SqliteOrganizationRepository<'a>> {
        OrganizationService::new(SqliteOrganizationRepository::new(self.conn))
    }

    fn surveys(&self) -> SurveyService<SqliteSurveyRepository<'a>> {
        SurveyService::new(SqliteSurveyRepository::new(self.conn))
    }

    fn responses(
        &self,
    ) -> ResponseService<SqliteSurveyRepository<'a>, SqliteResponseRepository<'a>> {
        ResponseService::new(
            SqliteSurveyRepository::new(self.conn),
            SqliteResponseRepository::new(self.conn),
        )
    }

    fn analyzer(&self) -> AnalyzerService<SqliteAnalysisRepository<'a>> {
        AnalyzerService::new(
            SqliteAnalysisRepository::new(self.conn),
            self.config.max_upload_bytes,
        )
    }
}

pub(crate) fn handle(
    ctx: &Context<'_>,
    route: &RouteMatch,
    request: &ApiRequest,
) -> ServiceResult<ApiResponse> {
    let viewer = &ctx.viewer;
    match route.operation {
        Operation::Register => {
            let registration: Registration = parse_json(&request.body)?;
            ApiResponse::json(201, &ctx.auth().register(&registration)?)
        }
        Operation::Login => {
            let payload: LoginPayload = parse_json(&request.body)?;
            ApiResponse::json(200, &ctx.auth().login(&payload.email, &payload.password)?)
        }
        Operation::RefreshToken => {
            let payload: RefreshPayload = parse_json(&request.body)?;
            let access = ctx.auth().refresh(&payload.refresh)?;
            ApiResponse::json(200, &json!({ "access": access }))
        }
        Operation::GetProfile => ApiResponse::json(200, &ctx.auth().profile(viewer)?),
        Operation::UpdateProfile => {
            let update: ProfileUpdate = parse_json(&request.body)?;
            ApiResponse::json(200, &ctx.auth().update_profile(viewer, &update)?)
        }

        Operation::ListOrganizations => ApiResponse::json(200, &ctx.organizations().list()?),
        Operation::CreateOrganization => {
            let draft: OrganizationDraft = parse_json(&request.body)?;
            ApiResponse::json(201, &ctx.organizations().create(viewer, &draft)?)
        }
        Operation::GetOrganization => {
            ApiResponse::json(200, &ctx.organizations().get(viewer, route.param(0))?)
        }
        Operation::UpdateOrganization => {
            let draft: OrganizationDraft = parse_json(&request.body)?;
            let updated = ctx.organizations().update(viewer, route.param(0), &draft)?;
            ApiResponse::json(200, &updated)
        }
        Operation::DeleteOrganization => {
            ctx.organizations().delete(viewer, route.param(0))?;
            Ok(ApiResponse::no_content())
        }

        Operation::ListSurveys => ApiResponse::json(200, &ctx.surveys().list_surveys(viewer)?),
        Operation::CreateSurvey => {
            let draft: SurveyDraft = parse_json(&request.body)?;
            ApiResponse::json(201, &ctx.surveys().create_survey(viewer, &draft)?)
        }
        Operation::GetSurvey => {
            ApiResponse::json(200, &ctx.surveys().get_survey(viewer, route.param(0))?)
        }
        Operation::UpdateSurvey => {
            let draft: SurveyDraft = parse_json(&request.body)?;
            let updated = ctx.surveys().update_survey(viewer, route.param(0), &draft)?;
            ApiResponse::json(200, &updated)
        }
        Operation::PatchSurvey => {
            let patch: SurveyPatch = parse_json(&request.body)?;
            let patched = ctx.surveys().patch_survey(viewer, route.param(0), &patch)?;
            ApiResponse::json(200, &patched)
        }
        Operation::DeleteSurvey => {
            ctx.surveys().delete_survey(viewer, route.param(0))?;
            Ok(ApiResponse::no_content())
        }
        Operation::GetPublicSurvey => {
            ApiResponse::json(200, &ctx.surveys().public_survey(viewer, route.param(0))?)
        }
        Operation::GetCreatorSurvey => {
            let survey = ctx
                .surveys()
                .creator_survey(viewer, route.param(0), route.param(1))?;
            ApiResponse::json(200, &survey)
        }
        Operation::ListOrganizationSurveys => {
            ApiResponse::json(200, &ctx.surveys().organization_surveys(viewer)?)
        }

        Operation::ListResponses => {
            let survey_id = request
                .query_value("survey")
                .map(|raw| {
                    raw.trim().parse::<i64>().map_err(|_| {
                        ServiceError::BadRequest("survey must be an integer id.".to_string())
                    })
                })
                .transpose()?;
            ApiResponse::json(200, &ctx.responses().list_responses(viewer, survey_id)?)
        }
        Operation::SubmitResponse => {
            let payload: SubmissionPayload = parse_json(&request.body)?;
            ctx.responses().submit(viewer, &payload)?;
            Ok(ApiResponse::detail(201, SUBMIT_CONFIRMATION))
        }
        Operation::GetResponse => {
            ApiResponse::json(200, &ctx.responses().get_response(viewer, route.param(0))?)
        }

        Operation::UploadCsv => {
            let uploaded =
                ctx.analyzer()
                    .upload_csv(viewer, request.query_value("file_name"), &request.body)?;
            ApiResponse::json(201, &uploaded)
        }
        Operation::ListCsvUploads => ApiResponse::json(200, &ctx.analyzer().list_uploads(viewer)?),
        Operation::PlotData => {
            let plot: PlotRequest = parse_json(&request.body)?;
            ApiResponse::json(200, &ctx.analyzer().plot_data(viewer, &plot)?)
        }
        Operation::GroupBy => {
            let group_by: GroupByRequest = parse_json(&request.body)?;
            ApiResponse::json(200, &ctx.analyzer().group_by(viewer, &group_by)?)
        }
        Operation::ListAnalyses => ApiResponse::json(200, &ctx.analyzer().list_analyses(viewer)?),
        Operation::CreateAnalysis => {
            let draft: AnalysisDraft = parse_json(&request.body)?;
            ApiResponse::json(201, &ctx.analyzer().create_analysis(viewer, &draft)?)
        }
        Operation::PublishAnalysis => {
            let payload: PublishPayload = parse_json(&request.body)?;
            let report =
                ctx.analyzer()
                    .publish_analysis(viewer, payload.analysis_id, ctx.renderer)?;
            Ok(ApiResponse::attachment(
                report.content_type,
                &report.file_name,
                report.bytes,
            ))
        }

        Operation::Health => health(),
    }
}

pub(crate) fn health() -> ServiceResult<ApiResponse> {
    ApiResponse::json(
        200,
        &json!({ "status": "ok", "version": jigyasa_core::core_version() }),
    )
}

/// Decodes a JSON body; an empty body reads as `{}`.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> ServiceResult<T> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|err| ServiceError::BadRequest(format!("JSON parse error - {err}")))
}
