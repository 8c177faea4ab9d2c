//! CSV analyzer domain model: uploads, plot requests and saved analyses.

use crate::model::account::UserId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CsvUploadId = i64;
pub type AnalysisId = i64;

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid date regex"));

/// Uploaded CSV file metadata. Content is loaded separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvUpload {
    pub id: CsvUploadId,
    #[serde(skip)]
    pub user_id: UserId,
    pub file_name: String,
    pub uploaded_at: i64,
}

/// Supported chart kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotType {
    Scatter,
    Bar,
    Line,
    Area,
    Pie,
    Box,
    Heatmap,
}

/// Plot request over one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlotRequest {
    pub plot_type: PlotType,
    #[serde(default)]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub y_axes: Vec<String>,
    pub csv_upload_id: CsvUploadId,
}

/// Group-by request over one uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GroupByRequest {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub csv_upload_id: Option<CsvUploadId>,
}

/// Chart-library shaped document: a list of traces plus a layout object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub data: Vec<Value>,
    pub layout: Value,
}

/// One plot stored inside an analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedPlot {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data: Option<Figure>,
}

/// Analysis create payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisDraft {
    pub title: String,
    pub author_name: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub plots: Vec<SavedPlot>,
}

impl AnalysisDraft {
    pub fn validate(&self) -> Result<(), AnalysisValidationError> {
        if self.title.trim().is_empty() {
            return Err(AnalysisValidationError::EmptyTitle);
        }
        if self.author_name.trim().is_empty() {
            return Err(AnalysisValidationError::EmptyAuthor);
        }
        if !is_calendar_date(self.date.trim()) {
            return Err(AnalysisValidationError::InvalidDate(self.date.clone()));
        }
        Ok(())
    }
}

/// `YYYY-MM-DD` naming a day that exists in the proleptic Gregorian calendar.
fn is_calendar_date(value: &str) -> bool {
    let Some(parts) = ISO_DATE_RE.captures(value) else {
        return false;
    };
    let field = |index: usize| parts[index].parse::<u32>().ok();
    let (Some(year), Some(month), Some(day)) = (field(1), field(2), field(3)) else {
        return false;
    };
    let leap = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
    let month_len = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => return false,
    };
    (1..=month_len).contains(&day)
}

/// Persisted analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub id: AnalysisId,
    #[serde(skip)]
    pub user_id: UserId,
    pub title: String,
    pub author_name: String,
    pub date: String,
    pub description: String,
    pub plots: Vec<SavedPlot>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisValidationError {
    EmptyTitle,
    EmptyAuthor,
    InvalidDate(String),
}

impl Display for AnalysisValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "analysis title must not be empty"),
            Self::EmptyAuthor => write!(f, "author_name must not be empty"),
            Self::InvalidDate(value) => {
                write!(f, "invalid date `{value}`; expected YYYY-MM-DD")
            }
        }
    }
}

impl Error for AnalysisValidationError {}

#[cfg(test)]
mod tests {
    use super::{AnalysisDraft, AnalysisValidationError, PlotRequest, PlotType};

    #[test]
    fn analysis_date_must_be_iso_calendar_date() {
        let mut draft = AnalysisDraft {
            title: "Q3".to_string(),
            author_name: "Ravi".to_string(),
            date: "2024-09-30".to_string(),
            description: String::new(),
            plots: Vec::new(),
        };
        assert!(draft.validate().is_ok());

        draft.date = "2024-02-29".to_string();
        assert!(draft.validate().is_ok());
        draft.date = "2000-02-29".to_string();
        assert!(draft.validate().is_ok());

        for bad in [
            "30/09/2024",
            "2024-02-31",
            "2023-02-29",
            "1900-02-29",
            "2024-04-31",
            "2024-13-01",
            "2024-00-10",
            "2024-01-00",
        ] {
            draft.date = bad.to_string();
            assert!(
                matches!(draft.validate(), Err(AnalysisValidationError::InvalidDate(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn plot_request_parses_snake_case_plot_type() {
        let request: PlotRequest = serde_json::from_str(
            r#"{"plot_type": "heatmap", "x_axis": "a", "y_axes": ["b"], "csv_upload_id": 4}"#,
        )
        .unwrap();
        assert_eq!(request.plot_type, PlotType::Heatmap);
        assert!(serde_json::from_str::<PlotRequest>(
            r#"{"plot_type": "violin", "csv_upload_id": 4}"#
        )
        .is_err());
    }
}
