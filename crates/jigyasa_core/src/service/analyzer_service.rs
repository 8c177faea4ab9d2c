//! CSV analyzer use-cases: uploads, figures, group-by, saved analyses and
//! report publishing.
//!
//! # Invariants
//! - Every operation needs an authenticated viewer and only touches that
//!   viewer's uploads and analyses.
//! - Upload bytes are parsed once on upload so broken files are rejected
//!   before they are stored.

use crate::analytics::{build_figure, group_counts, AnalyticsError, CsvTable};
use crate::model::account::{UserId, Viewer};
use crate::model::analysis::{
    Analysis, AnalysisDraft, AnalysisId, CsvUpload, CsvUploadId, Figure, GroupByRequest,
    PlotRequest,
};
use crate::report::{report_filename, ReportDocument, ReportRenderer};
use crate::repo::analysis_repo::AnalysisRepository;
use crate::service::error::{ServiceError, ServiceResult};
use log::{error, info};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

const DEFAULT_UPLOAD_NAME: &str = "upload.csv";

/// Upload acknowledgement with the detected header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub id: CsvUploadId,
    pub file_name: String,
    pub columns: Vec<String>,
}

/// Rendered report ready for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedReport {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub struct AnalyzerService<A: AnalysisRepository> {
    repo: A,
    max_upload_bytes: usize,
}

impl<A: AnalysisRepository> AnalyzerService<A> {
    pub fn new(repo: A, max_upload_bytes: usize) -> Self {
        Self {
            repo,
            max_upload_bytes,
        }
    }

    pub fn upload_csv(
        &self,
        viewer: &Viewer,
        file_name: Option<&str>,
        content: &[u8],
    ) -> ServiceResult<UploadResult> {
        let user_id = require_user(viewer)?;
        if content.is_empty() {
            return Err(ServiceError::BadRequest("No file was submitted.".to_string()));
        }
        if content.len() > self.max_upload_bytes {
            return Err(ServiceError::BadRequest(format!(
                "Uploaded file exceeds the {} byte limit.",
                self.max_upload_bytes
            )));
        }
        let table = CsvTable::parse(content)?;

        let file_name = file_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_UPLOAD_NAME);
        let upload = self.repo.create_upload(user_id, file_name, content)?;
        info!(
            "event=csv_upload module=analyzer status=ok upload_id={} bytes={} columns={} rows={}",
            upload.id,
            content.len(),
            table.column_names().len(),
            table.row_count()
        );
        Ok(UploadResult {
            id: upload.id,
            file_name: upload.file_name,
            columns: table.column_names(),
        })
    }

    pub fn list_uploads(&self, viewer: &Viewer) -> ServiceResult<Vec<CsvUpload>> {
        let user_id = require_user(viewer)?;
        Ok(self.repo.list_uploads(user_id)?)
    }

    pub fn plot_data(&self, viewer: &Viewer, request: &PlotRequest) -> ServiceResult<Figure> {
        let user_id = require_user(viewer)?;
        let table = self.load_table(user_id, request.csv_upload_id)?;
        let figure = build_figure(&table, request)?;
        info!(
            "event=plot_data module=analyzer status=ok upload_id={} plot_type={:?} traces={}",
            request.csv_upload_id,
            request.plot_type,
            figure.data.len()
        );
        Ok(figure)
    }

    pub fn group_by(&self, viewer: &Viewer, request: &GroupByRequest) -> ServiceResult<Value> {
        let user_id = require_user(viewer)?;
        let upload_id = match request.csv_upload_id {
            Some(id) if !request.columns.is_empty() => id,
            _ => return Err(AnalyticsError::MissingGroupByParameters.into()),
        };
        let table = self.load_table(user_id, upload_id)?;
        Ok(group_counts(&table, &request.columns)?)
    }

    pub fn list_analyses(&self, viewer: &Viewer) -> ServiceResult<Vec<Analysis>> {
        let user_id = require_user(viewer)?;
        Ok(self.repo.list_analyses(user_id)?)
    }

    pub fn create_analysis(&self, viewer: &Viewer, draft: &AnalysisDraft) -> ServiceResult<Analysis> {
        let user_id = require_user(viewer)?;
        draft.validate()?;
        let analysis = self.repo.create_analysis(user_id, draft)?;
        info!(
            "event=analysis_create module=analyzer status=ok analysis_id={} plots={}",
            analysis.id,
            analysis.plots.len()
        );
        Ok(analysis)
    }

    /// Renders one saved analysis through `renderer`.
    pub fn publish_analysis<R: ReportRenderer>(
        &self,
        viewer: &Viewer,
        analysis_id: AnalysisId,
        renderer: &R,
    ) -> ServiceResult<PublishedReport> {
        let started_at = Instant::now();
        let user_id = require_user(viewer)?;
        let analysis = self
            .repo
            .get_analysis(user_id, analysis_id)?
            .ok_or_else(|| ServiceError::not_found("analysis"))?;

        let rendered = ReportDocument::for_analysis(&analysis)
            .and_then(|document| Ok((document.image_count(), renderer.render(&document)?)));
        let (images, bytes) = rendered.map_err(|err| {
            error!(
                "event=analysis_publish module=analyzer status=error analysis_id={analysis_id} error={err}"
            );
            ServiceError::from(err)
        })?;
        info!(
            "event=analysis_publish module=analyzer status=ok analysis_id={analysis_id} images={images} bytes={} duration_ms={}",
            bytes.len(),
            started_at.elapsed().as_millis()
        );
        Ok(PublishedReport {
            file_name: report_filename(&analysis.title),
            content_type: renderer.content_type(),
            bytes,
        })
    }

    fn load_table(&self, user_id: UserId, upload_id: CsvUploadId) -> ServiceResult<CsvTable> {
        let (_, content) = self
            .repo
            .get_upload(user_id, upload_id)?
            .ok_or_else(|| ServiceError::NotFound("CSV file not found.".to_string()))?;
        Ok(CsvTable::parse(&content)?)
    }
}

fn require_user(viewer: &Viewer) -> ServiceResult<UserId> {
    viewer.user_id().ok_or_else(ServiceError::unauthenticated)
}
