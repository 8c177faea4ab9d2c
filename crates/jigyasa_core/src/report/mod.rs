//! Analysis report assembly and rendering.
//!
//! # Responsibility
//! - Turn a saved analysis into a renderer-neutral block document, with
//!   each plot rasterized to a PNG.
//! - Render documents through the `ReportRenderer` seam.
//!
//! # Invariants
//! - Plots without figure data are skipped; every other plot yields exactly
//!   one `Block::Image`.

pub mod chart;
pub mod pdf;

use crate::model::analysis::{Analysis, Figure};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use chart::{render_png, CHART_HEIGHT_PX, CHART_WIDTH_PX};
pub use pdf::PdfReportRenderer;

/// DejaVu Sans; covers Latin, Greek, Cyrillic, Arabic and Hebrew.
pub(crate) const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

const UNTITLED_PLOT: &str = "Untitled Plot";

/// Rasterized plot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotImage {
    pub png: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

/// One layout block. Spacer heights are in points.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Heading(String),
    Subheading(String),
    Paragraph(String),
    Image(PlotImage),
    Spacer(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub title: String,
    pub blocks: Vec<Block>,
}

impl ReportDocument {
    /// Cover section, a "Plots" heading, then one section per plot.
    pub fn for_analysis(analysis: &Analysis) -> Result<Self, ReportError> {
        let mut blocks = vec![
            Block::Title(analysis.title.clone()),
            Block::Spacer(12.0),
            Block::Paragraph(format!("Author: {}", analysis.author_name)),
            Block::Paragraph(format!("Date: {}", analysis.date)),
            Block::Spacer(12.0),
        ];
        if !analysis.description.trim().is_empty() {
            blocks.push(Block::Paragraph(analysis.description.clone()));
            blocks.push(Block::Spacer(24.0));
        }
        blocks.push(Block::Heading("Plots".to_string()));
        blocks.push(Block::Spacer(12.0));

        for plot in &analysis.plots {
            let Some(figure) = plot.data.as_ref() else {
                continue;
            };
            let title = plot
                .title
                .as_deref()
                .filter(|title| !title.trim().is_empty())
                .unwrap_or(UNTITLED_PLOT);
            blocks.push(Block::Subheading(title.to_string()));
            if let Some(description) = plot.description.as_deref() {
                if !description.trim().is_empty() {
                    blocks.push(Block::Paragraph(description.to_string()));
                }
            }
            blocks.push(Block::Image(PlotImage {
                png: render_png(figure)?,
                width_px: CHART_WIDTH_PX,
                height_px: CHART_HEIGHT_PX,
            }));
            blocks.push(Block::Spacer(24.0));
        }

        Ok(Self {
            title: analysis.title.clone(),
            blocks,
        })
    }

    pub fn image_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| matches!(block, Block::Image(_)))
            .count()
    }
}

/// Attachment file name for a report title.
pub fn report_filename(title: &str) -> String {
    let cleaned = title
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect::<String>();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "report.pdf".to_string()
    } else {
        format!("{cleaned}.pdf")
    }
}

/// Plain or `{text}` title of a layout or axis object.
pub(crate) fn title_text(holder: &Value) -> Option<&str> {
    match holder.get("title")? {
        Value::String(title) => Some(title.as_str()),
        Value::Object(map) => map.get("text").and_then(Value::as_str),
        _ => None,
    }
}

/// Output seam for report documents.
pub trait ReportRenderer {
    /// MIME type of the rendered bytes.
    fn content_type(&self) -> &'static str;
    fn render(&self, document: &ReportDocument) -> Result<Vec<u8>, ReportError>;
}

#[derive(Debug)]
pub enum ReportError {
    /// Chart drawing or PNG encoding failed.
    Chart(String),
    Font(String),
    Pdf(String),
    InvalidDocument(String),
}

impl Display for ReportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chart(message) => write!(f, "chart rendering failed: {message}"),
            Self::Font(message) => write!(f, "report font unusable: {message}"),
            Self::Pdf(message) => write!(f, "pdf assembly failed: {message}"),
            Self::InvalidDocument(message) => write!(f, "invalid report document: {message}"),
        }
    }
}

impl Error for ReportError {}

#[cfg(test)]
mod tests {
    use super::{report_filename, title_text, Block, ReportDocument};
    use crate::model::analysis::{Analysis, Figure, SavedPlot};
    use serde_json::json;

    fn analysis(plots: Vec<SavedPlot>) -> Analysis {
        Analysis {
            id: 1,
            user_id: 1,
            title: "Q3 review".to_string(),
            author_name: "Ravi".to_string(),
            date: "2024-09-30".to_string(),
            description: String::new(),
            plots,
            created_at: 0,
        }
    }

    #[test]
    fn each_plot_with_data_becomes_one_png() {
        let document = ReportDocument::for_analysis(&analysis(vec![
            SavedPlot {
                title: Some("Empty".to_string()),
                description: None,
                data: None,
            },
            SavedPlot {
                title: None,
                description: Some("Units by month".to_string()),
                data: Some(Figure {
                    data: vec![json!({"type": "bar", "name": "units", "x": [1, 2, 3], "y": [1, 2, 3]})],
                    layout: json!({"title": "units vs month"}),
                }),
            },
        ]))
        .unwrap();

        assert!(!document.blocks.contains(&Block::Subheading("Empty".to_string())));
        assert!(document
            .blocks
            .contains(&Block::Subheading("Untitled Plot".to_string())));
        assert_eq!(document.image_count(), 1);
        let png = document
            .blocks
            .iter()
            .find_map(|block| match block {
                Block::Image(image) => Some(&image.png),
                _ => None,
            })
            .unwrap();
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
    }

    #[test]
    fn title_text_reads_plain_and_nested_titles() {
        assert_eq!(title_text(&json!({"title": "Share"})), Some("Share"));
        assert_eq!(title_text(&json!({"title": {"text": "Share"}})), Some("Share"));
        assert_eq!(title_text(&json!({"title": 3})), None);
        assert_eq!(title_text(&json!({})), None);
    }

    #[test]
    fn filename_strips_header_breaking_characters() {
        assert_eq!(report_filename("Q3 \"final\""), "Q3 _final_.pdf");
        assert_eq!(report_filename("  "), "report.pdf");
    }
}
