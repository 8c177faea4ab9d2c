//! CSV upload and saved-analysis persistence.
//!
//! # Invariants
//! - Every read is scoped to the owning user; other users' rows behave as
//!   missing.
//! - `analyses.plots` holds a JSON array of saved plots.

use crate::model::account::UserId;
use crate::model::analysis::{Analysis, AnalysisDraft, AnalysisId, CsvUpload, CsvUploadId, SavedPlot};
use crate::repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const ANALYSIS_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    title,
    author_name,
    date,
    description,
    plots,
    created_at
FROM analyses";

pub trait AnalysisRepository {
    fn create_upload(&self, user_id: UserId, file_name: &str, content: &[u8])
        -> RepoResult<CsvUpload>;
    /// Returns upload metadata plus raw bytes when owned by `user_id`.
    fn get_upload(
        &self,
        user_id: UserId,
        upload_id: CsvUploadId,
    ) -> RepoResult<Option<(CsvUpload, Vec<u8>)>>;
    /// Lists upload metadata, newest first.
    fn list_uploads(&self, user_id: UserId) -> RepoResult<Vec<CsvUpload>>;
    fn create_analysis(&self, user_id: UserId, draft: &AnalysisDraft) -> RepoResult<Analysis>;
    fn get_analysis(&self, user_id: UserId, analysis_id: AnalysisId)
        -> RepoResult<Option<Analysis>>;
    /// Lists analyses, newest first.
    fn list_analyses(&self, user_id: UserId) -> RepoResult<Vec<Analysis>>;
}

pub struct SqliteAnalysisRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAnalysisRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AnalysisRepository for SqliteAnalysisRepository<'_> {
    fn create_upload(
        &self,
        user_id: UserId,
        file_name: &str,
        content: &[u8],
    ) -> RepoResult<CsvUpload> {
        self.conn.execute(
            "INSERT INTO csv_uploads (user_id, file_name, content) VALUES (?1, ?2, ?3);",
            params![user_id, file_name, content],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_upload(user_id, id)?
            .map(|(upload, _)| upload)
            .ok_or(RepoError::NotFound {
                entity: "csv upload",
                id,
            })
    }

    fn get_upload(
        &self,
        user_id: UserId,
        upload_id: CsvUploadId,
    ) -> RepoResult<Option<(CsvUpload, Vec<u8>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, file_name, uploaded_at, content
             FROM csv_uploads
             WHERE id = ?1 AND user_id = ?2;",
        )?;
        let mut rows = stmt.query(params![upload_id, user_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some((parse_upload_row(row)?, row.get("content")?)));
        }
        Ok(None)
    }

    fn list_uploads(&self, user_id: UserId) -> RepoResult<Vec<CsvUpload>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, file_name, uploaded_at
             FROM csv_uploads
             WHERE user_id = ?1
             ORDER BY id DESC;",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut uploads = Vec::new();
        while let Some(row) = rows.next()? {
            uploads.push(parse_upload_row(row)?);
        }
        Ok(uploads)
    }

    fn create_analysis(&self, user_id: UserId, draft: &AnalysisDraft) -> RepoResult<Analysis> {
        let plots = serde_json::to_string(&draft.plots)
            .map_err(|err| RepoError::InvalidData(format!("unserializable plots: {err}")))?;
        self.conn.execute(
            "INSERT INTO analyses (user_id, title, author_name, date, description, plots)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                user_id,
                draft.title.trim(),
                draft.author_name.trim(),
                draft.date.trim(),
                draft.description.as_str(),
                plots,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_analysis(user_id, id)?.ok_or(RepoError::NotFound {
            entity: "analysis",
            id,
        })
    }

    fn get_analysis(
        &self,
        user_id: UserId,
        analysis_id: AnalysisId,
    ) -> RepoResult<Option<Analysis>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ANALYSIS_SELECT_SQL} WHERE id = ?1 AND user_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![analysis_id, user_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_analysis_row(row)?));
        }
        Ok(None)
    }

    fn list_analyses(&self, user_id: UserId) -> RepoResult<Vec<Analysis>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ANALYSIS_SELECT_SQL} WHERE user_id = ?1 ORDER BY id DESC;"
        ))?;
        let mut rows = stmt.query([user_id])?;
        let mut analyses = Vec::new();
        while let Some(row) = rows.next()? {
            analyses.push(parse_analysis_row(row)?);
        }
        Ok(analyses)
    }
}

fn parse_upload_row(row: &Row<'_>) -> RepoResult<CsvUpload> {
    Ok(CsvUpload {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        file_name: row.get("file_name")?,
        uploaded_at: row.get("uploaded_at")?,
    })
}

fn parse_analysis_row(row: &Row<'_>) -> RepoResult<Analysis> {
    let raw_plots: String = row.get("plots")?;
    let plots: Vec<SavedPlot> = serde_json::from_str(&raw_plots)
        .map_err(|err| RepoError::InvalidData(format!("invalid JSON in analyses.plots: {err}")))?;
    Ok(Analysis {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        author_name: row.get("author_name")?,
        date: row.get("date")?,
        description: row.get("description")?,
        plots,
        created_at: row.get("created_at")?,
    })
}
