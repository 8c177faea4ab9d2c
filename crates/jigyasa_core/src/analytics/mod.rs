//! CSV analytics: table parsing, chart figures and grouped counts.
//!
//! # Responsibility
//! - Parse uploaded CSV bytes into typed columns.
//! - Build chart-library shaped figures and group-by summaries.
//!
//! # Invariants
//! - Pure functions over an in-memory table; no storage access.
//! - Every caller-correctable problem is an `AnalyticsError` (400 class).

pub mod groupby;
pub mod plot;
pub mod table;

use std::error::Error;
use std::fmt::{Display, Formatter};

pub use groupby::group_counts;
pub use plot::build_figure;
pub use table::{CellKey, Column, CsvTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    Csv(String),
    EmptyHeader,
    MissingAxes,
    InvalidAxes,
    PieMissingX,
    PieInvalidX,
    PieTooManyY,
    HeatmapNotNumeric(String),
    MissingGroupByParameters,
    InvalidColumn(String),
}

impl Display for AnalyticsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv(message) => write!(f, "could not parse CSV: {message}"),
            Self::EmptyHeader => write!(f, "CSV file has no header row"),
            Self::MissingAxes => write!(f, "x_axis and y_axes are required for this plot type."),
            Self::InvalidAxes => write!(f, "Invalid columns selected for x_axis or y_axes."),
            Self::PieMissingX => write!(f, "x_axis is required for pie charts."),
            Self::PieInvalidX => write!(f, "Invalid column selected for x_axis."),
            Self::PieTooManyY => write!(f, "Pie chart supports only one Y-axis variable."),
            Self::HeatmapNotNumeric(_) => write!(
                f,
                "Could not create heatmap with the selected columns. Please ensure the data is suitable for a heatmap."
            ),
            Self::MissingGroupByParameters => write!(f, "Missing required parameters."),
            Self::InvalidColumn(column) => write!(f, "Invalid column selected: {column}"),
        }
    }
}

impl Error for AnalyticsError {}

impl From<csv::Error> for AnalyticsError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value.to_string())
    }
}
