//! Explicit route table: `(Method, pattern) -> Operation`.
//!
//! # Invariants
//! - A trailing slash and a leading `/api` segment are optional on every
//!   path.
//! - `{name}` segments only match positive integer ids.
//! - Table order decides between overlapping patterns.

use crate::envelope::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    Login,
    RefreshToken,
    GetProfile,
    UpdateProfile,
    ListOrganizations,
    CreateOrganization,
    GetOrganization,
    UpdateOrganization,
    DeleteOrganization,
    ListSurveys,
    CreateSurvey,
    GetSurvey,
    UpdateSurvey,
    PatchSurvey,
    DeleteSurvey,
    GetPublicSurvey,
    GetCreatorSurvey,
    ListOrganizationSurveys,
    ListResponses,
    SubmitResponse,
    GetResponse,
    UploadCsv,
    ListCsvUploads,
    PlotData,
    GroupBy,
    ListAnalyses,
    CreateAnalysis,
    PublishAnalysis,
    Health,
}

impl Operation {
    /// Stable name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::RefreshToken => "refreshToken",
            Self::GetProfile => "getProfile",
            Self::UpdateProfile => "updateProfile",
            Self::ListOrganizations => "listOrganizations",
            Self::CreateOrganization => "createOrganization",
            Self::GetOrganization => "getOrganization",
            Self::UpdateOrganization => "updateOrganization",
            Self::DeleteOrganization => "deleteOrganization",
            Self::ListSurveys => "listSurveys",
            Self::CreateSurvey => "createSurvey",
            Self::GetSurvey => "getSurvey",
            Self::UpdateSurvey => "updateSurvey",
            Self::PatchSurvey => "patchSurvey",
            Self::DeleteSurvey => "deleteSurvey",
            Self::GetPublicSurvey => "getPublicSurvey",
            Self::GetCreatorSurvey => "getCreatorSurvey",
            Self::ListOrganizationSurveys => "listOrganizationSurveys",
            Self::ListResponses => "listResponses",
            Self::SubmitResponse => "submitResponse",
            Self::GetResponse => "getResponse",
            Self::UploadCsv => "uploadCsv",
            Self::ListCsvUploads => "listCsvUploads",
            Self::PlotData => "plotData",
            Self::GroupBy => "groupBy",
            Self::ListAnalyses => "listAnalyses",
            Self::CreateAnalysis => "createAnalysis",
            Self::PublishAnalysis => "publishAnalysis",
            Self::Health => "health",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub method: Method,
    pub pattern: &'static str,
    pub operation: Operation,
}

const fn route(method: Method, pattern: &'static str, operation: Operation) -> Route {
    Route {
        method,
        pattern,
        operation,
    }
}

pub const ROUTES: &[Route] = &[
    route(Method::Post, "/auth/register", Operation::Register),
    route(Method::Post, "/auth/login", Operation::Login),
    route(Method::Post, "/auth/refresh", Operation::RefreshToken),
    route(Method::Get, "/auth/profile", Operation::GetProfile),
    route(Method::Put, "/auth/profile", Operation::UpdateProfile),
    route(Method::Patch, "/auth/profile", Operation::UpdateProfile),
    route(Method::Get, "/organizations", Operation::ListOrganizations),
    route(Method::Post, "/organizations", Operation::CreateOrganization),
    route(Method::Get, "/organizations/{id}", Operation::GetOrganization),
    route(Method::Put, "/organizations/{id}", Operation::UpdateOrganization),
    route(Method::Patch, "/organizations/{id}", Operation::UpdateOrganization),
    route(Method::Delete, "/organizations/{id}", Operation::DeleteOrganization),
    route(Method::Get, "/surveys", Operation::ListSurveys),
    route(Method::Post, "/surveys", Operation::CreateSurvey),
    route(Method::Post, "/create-survey", Operation::CreateSurvey),
    route(Method::Get, "/surveys/{id}", Operation::GetSurvey),
    route(Method::Put, "/surveys/{id}", Operation::UpdateSurvey),
    route(Method::Patch, "/surveys/{id}", Operation::PatchSurvey),
    route(Method::Delete, "/surveys/{id}", Operation::DeleteSurvey),
    route(Method::Get, "/surveys/{id}/public", Operation::GetPublicSurvey),
    route(
        Method::Get,
        "/surveys/{creator_id}/{survey_id}",
        Operation::GetCreatorSurvey,
    ),
    route(
        Method::Get,
        "/organization-surveys",
        Operation::ListOrganizationSurveys,
    ),
    route(Method::Get, "/survey-responses", Operation::ListResponses),
    route(Method::Post, "/survey-responses", Operation::SubmitResponse),
    route(Method::Get, "/survey-responses/{id}", Operation::GetResponse),
    route(
        Method::Post,
        "/survey-analyzer/csv-uploads",
        Operation::UploadCsv,
    ),
    route(
        Method::Get,
        "/survey-analyzer/csv-uploads",
        Operation::ListCsvUploads,
    ),
    route(Method::Post, "/survey-analyzer/plot-data", Operation::PlotData),
    route(Method::Post, "/survey-analyzer/groupby", Operation::GroupBy),
    route(Method::Get, "/survey-analyzer/analyses", Operation::ListAnalyses),
    route(
        Method::Post,
        "/survey-analyzer/analyses",
        Operation::CreateAnalysis,
    ),
    route(
        Method::Post,
        "/survey-analyzer/publish-analysis",
        Operation::PublishAnalysis,
    ),
    route(Method::Get, "/health", Operation::Health),
];

/// Matched operation plus its integer path parameters in pattern order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub operation: Operation,
    pub params: Vec<i64>,
}

impl RouteMatch {
    /// Path parameter at `index`; patterns guarantee presence.
    pub fn param(&self, index: usize) -> i64 {
        self.params.get(index).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched(RouteMatch),
    /// Path exists but not for this method.
    MethodNotAllowed,
    NotFound,
}

pub fn resolve(method: Method, path: &str) -> Resolution {
    let segments = normalized_segments(path);
    let mut path_known = false;
    for route in ROUTES {
        let Some(params) = match_pattern(route.pattern, &segments) else {
            continue;
        };
        if route.method == method {
            return Resolution::Matched(RouteMatch {
                operation: route.operation,
                params,
            });
        }
        path_known = true;
    }
    if path_known {
        Resolution::MethodNotAllowed
    } else {
        Resolution::NotFound
    }
}

fn normalized_segments(path: &str) -> Vec<&str> {
    let path = path.split('?').next().unwrap_or_default();
    let mut segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    if segments.first() == Some(&"api") {
        segments.remove(0);
    }
    segments
}

fn match_pattern(pattern: &str, segments: &[&str]) -> Option<Vec<i64>> {
    let parts = pattern
        .split('/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    if parts.len() != segments.len() {
        return None;
    }
    let mut params = Vec::new();
    for (part, segment) in parts.iter().zip(segments) {
        if part.starts_with('{') && part.ends_with('}') {
            let id = segment.parse::<i64>().ok().filter(|id| *id > 0)?;
            params.push(id);
        } else if part != segment {
            return None;
        }
    }
    Some(params)
}
