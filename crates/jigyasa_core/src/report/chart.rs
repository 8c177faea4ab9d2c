//! Rasterizes stored figure documents to PNG for reports.
//!
//! # Responsibility
//! - Draw `{data, layout}` figures (scatter, line, area, bar, box, pie,
//!   heatmap traces) onto an RGB bitmap and encode it as PNG.
//!
//! # Invariants
//! - Figures come from clients, so unknown trace kinds draw as markers and
//!   non-numeric or non-finite values are skipped, never rejected.
//! - Every figure yields an image of `CHART_WIDTH_PX` x `CHART_HEIGHT_PX`.

use crate::model::analysis::Figure;
use crate::report::{title_text, ReportError, BUNDLED_FONT};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use once_cell::sync::OnceCell;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde_json::Value;
use std::fmt::Display;
use std::io::Cursor;

pub const CHART_WIDTH_PX: u32 = 960;
pub const CHART_HEIGHT_PX: u32 = 560;

const FONT_FAMILY: &str = "jigyasa-sans";
const CAPTION_SIZE: i32 = 24;
const LABEL_SIZE: i32 = 14;
const MAX_CATEGORY_LABELS: usize = 24;
/// Pie wedge outline resolution in degrees.
const ARC_STEP_DEG: f64 = 2.0;

const SERIES_COLORS: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

/// Viridis stops, low to high.
const HEAT_STOPS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

static FONT_READY: OnceCell<()> = OnceCell::new();

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Draws `figure` and returns PNG bytes.
pub fn render_png(figure: &Figure) -> Result<Vec<u8>, ReportError> {
    register_chart_font()?;

    let mut pixels = vec![0_u8; (CHART_WIDTH_PX * CHART_HEIGHT_PX * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut pixels, (CHART_WIDTH_PX, CHART_HEIGHT_PX)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;
        let title = title_text(&figure.layout).unwrap_or_default();

        match figure.data.first().map(trace_kind) {
            Some("pie") => draw_pie(&root, title, &figure.data[0])?,
            Some("heatmap") => draw_heatmap(&root, title, &figure.data[0], &figure.layout)?,
            Some("box") => draw_boxes(&root, title, &figure.data, &figure.layout)?,
            _ => draw_cartesian(&root, title, &figure.data, &figure.layout)?,
        }
        root.present().map_err(chart_error)?;
    }

    let bitmap = RgbImage::from_raw(CHART_WIDTH_PX, CHART_HEIGHT_PX, pixels)
        .ok_or_else(|| ReportError::Chart("bitmap size mismatch".to_string()))?;
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(bitmap)
        .write_to(&mut png, ImageOutputFormat::Png)
        .map_err(chart_error)?;
    Ok(png.into_inner())
}

fn register_chart_font() -> Result<(), ReportError> {
    FONT_READY
        .get_or_try_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, BUNDLED_FONT)
                .map_err(|_| ReportError::Font("bundled chart font is not a TrueType file".to_string()))
        })
        .map(|_| ())
}

fn chart_error(err: impl Display) -> ReportError {
    ReportError::Chart(err.to_string())
}

fn trace_kind(trace: &Value) -> &str {
    trace.get("type").and_then(Value::as_str).unwrap_or("scatter")
}

fn values<'a>(trace: &'a Value, key: &str) -> &'a [Value] {
    trace
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|number| number.is_finite())
}

fn label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn axis_title<'a>(layout: &'a Value, axis: &str) -> &'a str {
    layout.get(axis).and_then(title_text).unwrap_or_default()
}

fn series_color(index: usize) -> RGBColor {
    SERIES_COLORS[index % SERIES_COLORS.len()]
}

/// Widens a degenerate or empty range and adds a 5% margin.
fn padded(low: f64, high: f64) -> (f64, f64) {
    if !low.is_finite() || !high.is_finite() || low > high {
        return (0.0, 1.0);
    }
    if (high - low).abs() < f64::EPSILON {
        return (low - 1.0, high + 1.0);
    }
    let margin = (high - low) * 0.05;
    (low - margin, high + margin)
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), value| {
        (low.min(value), high.max(value))
    })
}

/// Label for an integral tick on a category axis; blank between categories.
fn category_label(labels: &[String], tick: f64) -> String {
    let rounded = tick.round();
    if (tick - rounded).abs() > 1e-6 || rounded < 0.0 {
        return String::new();
    }
    labels.get(rounded as usize).cloned().unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Markers,
    Lines,
    Area,
    Bars,
}

struct Series {
    name: String,
    mark: Mark,
    points: Vec<(f64, f64)>,
}

fn mark_for(trace: &Value) -> Mark {
    if trace_kind(trace) == "bar" {
        return Mark::Bars;
    }
    if trace.get("fill").and_then(Value::as_str).is_some_and(|fill| fill != "none") {
        return Mark::Area;
    }
    match trace.get("mode").and_then(Value::as_str) {
        Some(mode) if mode.contains("lines") => Mark::Lines,
        _ => Mark::Markers,
    }
}

/// Scatter, line, area and bar traces sharing one x axis.
fn draw_cartesian(root: &Area<'_>, title: &str, traces: &[Value], layout: &Value) -> Result<(), ReportError> {
    let any_bars = traces.iter().any(|trace| mark_for(trace) == Mark::Bars);
    let numeric_x = !any_bars
        && traces.iter().all(|trace| {
            values(trace, "x")
                .iter()
                .all(|x| x.is_null() || number(x).is_some())
        });

    // Category axis: labels in first-appearance order across all traces.
    let mut categories: Vec<String> = Vec::new();
    let mut series = Vec::with_capacity(traces.len());
    for (index, trace) in traces.iter().enumerate() {
        let xs = values(trace, "x");
        let mut points = Vec::new();
        for (row, y) in values(trace, "y").iter().enumerate() {
            let Some(y) = number(y) else { continue };
            // Traces without x are plotted against their row index.
            let x = if xs.is_empty() {
                Some(Value::from(row))
            } else {
                xs.get(row).cloned()
            };
            let x = match x.as_ref() {
                None | Some(Value::Null) => continue,
                Some(x) if numeric_x => match number(x) {
                    Some(x) => x,
                    None => continue,
                },
                Some(x) => {
                    let name = label(x);
                    match categories.iter().position(|known| *known == name) {
                        Some(position) => position as f64,
                        None => {
                            categories.push(name);
                            (categories.len() - 1) as f64
                        }
                    }
                }
            };
            points.push((x, y));
        }
        series.push(Series {
            name: trace
                .get("name")
                .and_then(Value::as_str)
                .map_or_else(|| format!("trace {}", index + 1), str::to_string),
            mark: mark_for(trace),
            points,
        });
    }

    let (x_low, x_high) = if numeric_x {
        let (low, high) = bounds(series.iter().flat_map(|s| s.points.iter().map(|p| p.0)));
        padded(low, high)
    } else {
        (-0.5, categories.len().max(1) as f64 - 0.5)
    };
    let (mut y_low, mut y_high) = bounds(series.iter().flat_map(|s| s.points.iter().map(|p| p.1)));
    if series.iter().any(|s| matches!(s.mark, Mark::Bars | Mark::Area)) {
        y_low = y_low.min(0.0);
        y_high = y_high.max(0.0);
    }
    let (y_low, y_high) = padded(y_low, y_high);

    let mut chart = ChartBuilder::on(root)
        .caption(title, (FONT_FAMILY, CAPTION_SIZE).into_font())
        .margin(16)
        .x_label_area_size(44)
        .y_label_area_size(64)
        .build_cartesian_2d(x_low..x_high, y_low..y_high)
        .map_err(chart_error)?;

    let category_ticks = |tick: &f64| category_label(&categories, *tick);
    let mut mesh = chart.configure_mesh();
    mesh.x_desc(axis_title(layout, "xaxis"))
        .y_desc(axis_title(layout, "yaxis"))
        .label_style((FONT_FAMILY, LABEL_SIZE).into_font())
        .axis_desc_style((FONT_FAMILY, LABEL_SIZE + 2).into_font());
    if !numeric_x {
        mesh.x_labels(categories.len().clamp(1, MAX_CATEGORY_LABELS))
            .x_label_formatter(&category_ticks);
    }
    mesh.draw().map_err(chart_error)?;

    let bar_count = series.iter().filter(|s| s.mark == Mark::Bars).count().max(1);
    let bar_width = 0.8 / bar_count as f64;
    let mut bar_slot = 0;
    for (index, s) in series.iter().enumerate() {
        let color = series_color(index);
        let drawn = match s.mark {
            Mark::Markers => chart
                .draw_series(s.points.iter().map(|&point| Circle::new(point, 4, color.filled())))
                .map_err(chart_error)?,
            Mark::Lines => chart
                .draw_series(LineSeries::new(s.points.iter().copied(), color.stroke_width(2)))
                .map_err(chart_error)?,
            Mark::Area => chart
                .draw_series(
                    AreaSeries::new(s.points.iter().copied(), 0.0, color.mix(0.25))
                        .border_style(color.stroke_width(2)),
                )
                .map_err(chart_error)?,
            Mark::Bars => {
                let offset = (bar_slot as f64 - (bar_count as f64 - 1.0) / 2.0) * bar_width;
                bar_slot += 1;
                chart
                    .draw_series(s.points.iter().map(|&(x, y)| {
                        let left = x + offset - bar_width / 2.0;
                        Rectangle::new([(left, 0.0), (left + bar_width, y)], color.filled())
                    }))
                    .map_err(chart_error)?
            }
        };
        drawn
            .label(s.name.clone())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 14, y + 5)], color.filled()));
    }

    if series.len() > 1 {
        chart
            .configure_series_labels()
            .label_font((FONT_FAMILY, LABEL_SIZE).into_font())
            .background_style(WHITE.mix(0.85))
            .border_style(BLACK)
            .draw()
            .map_err(chart_error)?;
    }
    Ok(())
}

/// Five-number summary: min, q1, median, q3, max.
fn five_numbers(mut sample: Vec<f64>) -> Option<[f64; 5]> {
    if sample.is_empty() {
        return None;
    }
    sample.sort_by(f64::total_cmp);
    let quantile = |q: f64| {
        let rank = q * (sample.len() - 1) as f64;
        let below = rank.floor() as usize;
        let above = rank.ceil() as usize;
        sample[below] + (sample[above] - sample[below]) * (rank - below as f64)
    };
    Some([
        sample[0],
        quantile(0.25),
        quantile(0.5),
        quantile(0.75),
        sample[sample.len() - 1],
    ])
}

fn draw_boxes(root: &Area<'_>, title: &str, traces: &[Value], layout: &Value) -> Result<(), ReportError> {
    let names = traces
        .iter()
        .enumerate()
        .map(|(index, trace)| {
            trace
                .get("name")
                .and_then(Value::as_str)
                .map_or_else(|| format!("trace {}", index + 1), str::to_string)
        })
        .collect::<Vec<_>>();
    let summaries = traces
        .iter()
        .map(|trace| five_numbers(values(trace, "y").iter().filter_map(number).collect()))
        .collect::<Vec<_>>();

    let (low, high) = bounds(summaries.iter().flatten().flat_map(|summary| [summary[0], summary[4]]));
    let (y_low, y_high) = padded(low, high);
    let mut chart = ChartBuilder::on(root)
        .caption(title, (FONT_FAMILY, CAPTION_SIZE).into_font())
        .margin(16)
        .x_label_area_size(44)
        .y_label_area_size(64)
        .build_cartesian_2d(-0.5..(names.len().max(1) as f64 - 0.5), y_low..y_high)
        .map_err(chart_error)?;

    let name_ticks = |tick: &f64| category_label(&names, *tick);
    chart
        .configure_mesh()
        .x_desc(axis_title(layout, "xaxis"))
        .y_desc(axis_title(layout, "yaxis"))
        .label_style((FONT_FAMILY, LABEL_SIZE).into_font())
        .axis_desc_style((FONT_FAMILY, LABEL_SIZE + 2).into_font())
        .x_labels(names.len().clamp(1, MAX_CATEGORY_LABELS))
        .x_label_formatter(&name_ticks)
        .draw()
        .map_err(chart_error)?;

    for (index, summary) in summaries.iter().enumerate() {
        let Some([min, q1, median, q3, max]) = *summary else {
            continue;
        };
        let color = series_color(index);
        let x = index as f64;
        chart
            .draw_series([
                Rectangle::new([(x - 0.3, q1), (x + 0.3, q3)], color.mix(0.3).filled()),
                Rectangle::new([(x - 0.3, q1), (x + 0.3, q3)], color.stroke_width(2)),
            ])
            .map_err(chart_error)?;
        chart
            .draw_series([
                PathElement::new(vec![(x - 0.3, median), (x + 0.3, median)], color.stroke_width(3)),
                PathElement::new(vec![(x, min), (x, q1)], color.stroke_width(2)),
                PathElement::new(vec![(x, q3), (x, max)], color.stroke_width(2)),
                PathElement::new(vec![(x - 0.15, min), (x + 0.15, min)], color.stroke_width(2)),
                PathElement::new(vec![(x - 0.15, max), (x + 0.15, max)], color.stroke_width(2)),
            ])
            .map_err(chart_error)?;
    }
    Ok(())
}

fn draw_pie(root: &Area<'_>, title: &str, trace: &Value) -> Result<(), ReportError> {
    let area = root
        .titled(title, (FONT_FAMILY, CAPTION_SIZE).into_font())
        .map_err(chart_error)?;
    let labels = values(trace, "labels");
    let slices = values(trace, "values")
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let value = number(value).filter(|value| *value > 0.0)?;
            Some((labels.get(index).map(label).unwrap_or_default(), value))
        })
        .collect::<Vec<_>>();
    let total = slices.iter().map(|(_, value)| value).sum::<f64>();
    if total <= 0.0 {
        return Ok(());
    }

    let (width, height) = area.dim_in_pixel();
    let center = (f64::from(width) / 2.0, f64::from(height) / 2.0);
    let radius = f64::from(width.min(height)) * 0.36;
    let label_style = TextStyle::from((FONT_FAMILY, LABEL_SIZE).into_font())
        .pos(Pos::new(HPos::Center, VPos::Center));
    let at = |angle_deg: f64, distance: f64| {
        let radians = angle_deg.to_radians();
        (
            (center.0 + distance * radians.cos()).round() as i32,
            (center.1 + distance * radians.sin()).round() as i32,
        )
    };

    // Clockwise from twelve o'clock.
    let mut start = -90.0;
    for (index, (name, value)) in slices.iter().enumerate() {
        let sweep = value / total * 360.0;
        let steps = (sweep / ARC_STEP_DEG).ceil().max(1.0) as usize;
        let mut outline = Vec::with_capacity(steps + 2);
        outline.push(at(0.0, 0.0));
        for step in 0..=steps {
            outline.push(at(start + sweep * step as f64 / steps as f64, radius));
        }
        area.draw(&Polygon::new(outline, series_color(index).filled()))
            .map_err(chart_error)?;

        let share = value / total * 100.0;
        area.draw(&Text::new(
            format!("{name} ({share:.1}%)"),
            at(start + sweep / 2.0, radius * 1.18),
            label_style.clone(),
        ))
        .map_err(chart_error)?;
        start += sweep;
    }
    Ok(())
}

fn heat_color(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (HEAT_STOPS.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(HEAT_STOPS.len() - 2);
    let fraction = scaled - lower as f64;
    let (from, to) = (HEAT_STOPS[lower], HEAT_STOPS[lower + 1]);
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * fraction).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

fn draw_heatmap(root: &Area<'_>, title: &str, trace: &Value, layout: &Value) -> Result<(), ReportError> {
    let rows = values(trace, "z")
        .iter()
        .map(|row| row.as_array().map(|cells| cells.iter().map(number).collect::<Vec<_>>()).unwrap_or_default())
        .collect::<Vec<_>>();
    let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    let column_labels = values(trace, "x").iter().map(label).collect::<Vec<_>>();
    let row_labels = values(trace, "y").iter().map(label).collect::<Vec<_>>();
    let (low, high) = bounds(rows.iter().flatten().flatten().copied());
    let span = if high > low { high - low } else { 1.0 };

    let mut chart = ChartBuilder::on(root)
        .caption(title, (FONT_FAMILY, CAPTION_SIZE).into_font())
        .margin(16)
        .x_label_area_size(44)
        .y_label_area_size(96)
        .build_cartesian_2d(
            -0.5..(column_count.max(1) as f64 - 0.5),
            -0.5..(rows.len().max(1) as f64 - 0.5),
        )
        .map_err(chart_error)?;

    let column_ticks = |tick: &f64| category_label(&column_labels, *tick);
    let row_ticks = |tick: &f64| category_label(&row_labels, *tick);
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(axis_title(layout, "xaxis"))
        .y_desc(axis_title(layout, "yaxis"))
        .label_style((FONT_FAMILY, LABEL_SIZE).into_font())
        .axis_desc_style((FONT_FAMILY, LABEL_SIZE + 2).into_font())
        .x_labels(column_count.clamp(1, MAX_CATEGORY_LABELS))
        .y_labels(rows.len().clamp(1, MAX_CATEGORY_LABELS))
        .x_label_formatter(&column_ticks)
        .y_label_formatter(&row_ticks)
        .draw()
        .map_err(chart_error)?;

    chart
        .draw_series(rows.iter().enumerate().flat_map(|(row, cells)| {
            cells.iter().enumerate().filter_map(move |(column, cell)| {
                let value = (*cell)?;
                let (x, y) = (column as f64, row as f64);
                Some(Rectangle::new(
                    [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)],
                    heat_color((value - low) / span).filled(),
                ))
            })
        }))
        .map_err(chart_error)?;
    Ok(())
}
