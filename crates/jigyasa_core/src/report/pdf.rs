//! PDF rendering of report documents.
//!
//! Pages are US Letter with one-inch margins. Text is set in an embedded
//! TrueType font (DejaVu Sans unless the operator supplies another), so
//! any script the font covers survives. Plot images are scaled to the text
//! width and kept whole on one page.

use crate::report::{Block, PlotImage, ReportDocument, ReportError, ReportRenderer, BUNDLED_FONT};
use ab_glyph::{Font, FontRef};
use image::ImageFormat;
use printpdf::{Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::borrow::Cow;
use std::path::Path;

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const LINE_SPACING: f32 = 1.2;
const MM_PER_PT: f32 = 25.4 / 72.0;
const LAYER: &str = "content";

struct Style {
    size: f32,
    space_after: f32,
}

fn text_style(block: &Block) -> Option<(&str, Style)> {
    let (text, size, space_after) = match block {
        Block::Title(text) => (text, 24.0, 30.0),
        Block::Heading(text) => (text, 18.0, 20.0),
        Block::Subheading(text) => (text, 14.0, 8.0),
        Block::Paragraph(text) => (text, 11.0, 4.0),
        Block::Image(_) | Block::Spacer(_) => return None,
    };
    Some((text.as_str(), Style { size, space_after }))
}

/// Renderer producing `application/pdf` bytes.
#[derive(Debug, Clone)]
pub struct PdfReportRenderer {
    font: Cow<'static, [u8]>,
}

impl Default for PdfReportRenderer {
    fn default() -> Self {
        Self {
            font: Cow::Borrowed(BUNDLED_FONT),
        }
    }
}

impl PdfReportRenderer {
    /// Uses `font` (TrueType or OpenType bytes) for all report text.
    pub fn with_font(font: Vec<u8>) -> Result<Self, ReportError> {
        FontRef::try_from_slice(&font).map_err(|err| ReportError::Font(err.to_string()))?;
        Ok(Self {
            font: Cow::Owned(font),
        })
    }

    pub fn from_font_file(path: &Path) -> Result<Self, ReportError> {
        let bytes = std::fs::read(path)
            .map_err(|err| ReportError::Font(format!("cannot read `{}`: {err}", path.display())))?;
        Self::with_font(bytes)
    }

    fn metrics(&self) -> Result<FontRef<'_>, ReportError> {
        FontRef::try_from_slice(&self.font).map_err(|err| ReportError::Font(err.to_string()))
    }
}

impl ReportRenderer for PdfReportRenderer {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn render(&self, document: &ReportDocument) -> Result<Vec<u8>, ReportError> {
        if document.blocks.is_empty() {
            return Err(ReportError::InvalidDocument(
                "document has no blocks".to_string(),
            ));
        }
        let metrics = self.metrics()?;
        let pages = paginate(document, |text, size| text_width(&metrics, text, size));
        self.write(&document.title, &pages)
    }
}

/// Content placed on a page, in points from the bottom-left corner.
#[derive(Debug, Clone, PartialEq)]
enum Placed<'d> {
    Text {
        text: String,
        size: f32,
        x: f32,
        baseline: f32,
    },
    Image {
        image: &'d PlotImage,
        x: f32,
        bottom: f32,
        width: f32,
    },
}

fn text_width<F: Font>(font: &F, text: &str, size: f32) -> f32 {
    let units_per_em = font.units_per_em().unwrap_or(1000.0);
    let advance: f32 = text
        .chars()
        .map(|c| font.h_advance_unscaled(font.glyph_id(c)))
        .sum();
    advance / units_per_em * size
}

fn paginate<'d>(
    document: &'d ReportDocument,
    measure: impl Fn(&str, f32) -> f32,
) -> Vec<Vec<Placed<'d>>> {
    let top = PAGE_HEIGHT - MARGIN;
    let body_width = PAGE_WIDTH - 2.0 * MARGIN;
    let body_height = PAGE_HEIGHT - 2.0 * MARGIN;
    let mut pages: Vec<Vec<Placed<'d>>> = vec![Vec::new()];
    let mut cursor = top;

    for block in &document.blocks {
        match block {
            Block::Spacer(height) => cursor -= height,
            Block::Image(image) => {
                let mut width = body_width;
                let mut height = width * image.height_px as f32 / image.width_px.max(1) as f32;
                if height > body_height {
                    width *= body_height / height;
                    height = body_height;
                }
                if cursor - height < MARGIN {
                    pages.push(Vec::new());
                    cursor = top;
                }
                cursor -= height;
                if let Some(page) = pages.last_mut() {
                    page.push(Placed::Image {
                        image,
                        x: MARGIN + (body_width - width) / 2.0,
                        bottom: cursor,
                        width,
                    });
                }
                cursor -= 6.0;
            }
            other => {
                let Some((text, style)) = text_style(other) else {
                    continue;
                };
                let line_height = style.size * LINE_SPACING;
                for line in wrap(text, |candidate| measure(candidate, style.size) <= body_width) {
                    if cursor - line_height < MARGIN {
                        pages.push(Vec::new());
                        cursor = top;
                    }
                    cursor -= line_height;
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(page) = pages.last_mut() {
                        page.push(Placed::Text {
                            text: line,
                            size: style.size,
                            x: MARGIN,
                            baseline: cursor,
                        });
                    }
                }
                cursor -= style.space_after;
            }
        }
    }
    pages
}

/// Greedy word wrap; `fits` decides whether a candidate line is narrow
/// enough. Words that never fit are split by character.
fn wrap(text: &str, fits: impl Fn(&str) -> bool) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if fits(&candidate) {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            for c in word.chars() {
                current.push(c);
                if !fits(&current) && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn mm(points: f32) -> Mm {
    Mm(points * MM_PER_PT)
}

impl PdfReportRenderer {
    fn write(&self, title: &str, pages: &[Vec<Placed<'_>>]) -> Result<Vec<u8>, ReportError> {
        let (doc, first_page, first_layer) =
            PdfDocument::new(title, mm(PAGE_WIDTH), mm(PAGE_HEIGHT), LAYER);
        let font = doc
            .add_external_font(&self.font[..])
            .map_err(|err| ReportError::Pdf(err.to_string()))?;

        for (index, placed) in pages.iter().enumerate() {
            let layer = if index == 0 {
                doc.get_page(first_page).get_layer(first_layer)
            } else {
                let (page, layer) = doc.add_page(mm(PAGE_WIDTH), mm(PAGE_HEIGHT), LAYER);
                doc.get_page(page).get_layer(layer)
            };
            for item in placed {
                place(&layer, &font, item)?;
            }
        }

        doc.save_to_bytes()
            .map_err(|err| ReportError::Pdf(err.to_string()))
    }
}

fn place(layer: &PdfLayerReference, font: &IndirectFontRef, item: &Placed<'_>) -> Result<(), ReportError> {
    match item {
        Placed::Text {
            text,
            size,
            x,
            baseline,
        } => layer.use_text(text.as_str(), *size, mm(*x), mm(*baseline), font),
        Placed::Image {
            image,
            x,
            bottom,
            width,
        } => {
            let bitmap = image::load_from_memory_with_format(&image.png, ImageFormat::Png)
                .map_err(|err| ReportError::Pdf(format!("plot image unreadable: {err}")))?;
            // Pixels per inch that makes the bitmap exactly `width` points wide.
            let dpi = image.width_px as f32 * 72.0 / width;
            Image::from_dynamic_image(&bitmap).add_to_layer(
                layer.clone(),
                ImageTransform {
                    translate_x: Some(mm(*x)),
                    translate_y: Some(mm(*bottom)),
                    dpi: Some(dpi),
                    ..Default::default()
                },
            );
        }
    }
    Ok(())
}
