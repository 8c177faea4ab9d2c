//! Figure builders for the supported chart kinds.
//!
//! Output follows the common `{data: [trace...], layout: {...}}` chart
//! document shape so clients can hand it straight to a plotting library.

use crate::analytics::table::{float_json, CellKey, Column, CsvTable};
use crate::analytics::AnalyticsError;
use crate::model::analysis::{Figure, PlotRequest, PlotType};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

const HEATMAP_COLORSCALE: &str = "Viridis";

/// Builds the figure for `request` over `table`.
pub fn build_figure(table: &CsvTable, request: &PlotRequest) -> Result<Figure, AnalyticsError> {
    match request.plot_type {
        PlotType::Pie => pie(table, request),
        PlotType::Heatmap => {
            let (x, ys) = xy_columns(table, request)?;
            heatmap(x, &ys)
        }
        PlotType::Box => {
            let (_, ys) = xy_columns(table, request)?;
            Ok(box_plot(&ys))
        }
        PlotType::Scatter | PlotType::Bar | PlotType::Line | PlotType::Area => {
            let (x, ys) = xy_columns(table, request)?;
            Ok(xy_traces(request.plot_type, x, &ys))
        }
    }
}

/// Resolves `x_axis` and every `y_axes` entry for the x/y chart kinds.
fn xy_columns<'t>(
    table: &'t CsvTable,
    request: &PlotRequest,
) -> Result<(&'t Column, Vec<&'t Column>), AnalyticsError> {
    let x_name = request
        .x_axis
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or(AnalyticsError::MissingAxes)?;
    if request.y_axes.is_empty() {
        return Err(AnalyticsError::MissingAxes);
    }
    let x = table.column(x_name).ok_or(AnalyticsError::InvalidAxes)?;
    let ys = request
        .y_axes
        .iter()
        .map(|name| table.column(name).ok_or(AnalyticsError::InvalidAxes))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((x, ys))
}

fn pie(table: &CsvTable, request: &PlotRequest) -> Result<Figure, AnalyticsError> {
    let x_name = request
        .x_axis
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or(AnalyticsError::PieMissingX)?;
    let x = table.column(x_name).ok_or(AnalyticsError::PieInvalidX)?;
    if request.y_axes.len() > 1 {
        return Err(AnalyticsError::PieTooManyY);
    }

    // (first row index, count) per value; ties keep first appearance.
    let mut counts: BTreeMap<&CellKey, (usize, u64)> = BTreeMap::new();
    for (row, cell) in x.cells().iter().enumerate() {
        if let Some(key) = cell {
            counts.entry(key).or_insert((row, 0)).1 += 1;
        }
    }
    let mut ordered = counts.into_iter().collect::<Vec<_>>();
    ordered.sort_by(|(_, (left_row, left_count)), (_, (right_row, right_count))| {
        right_count.cmp(left_count).then(left_row.cmp(right_row))
    });

    let values = ordered
        .iter()
        .map(|(_, (_, count))| json!(count))
        .collect::<Vec<_>>();
    let labels = ordered
        .iter()
        .map(|(key, _)| x.key_json(key))
        .collect::<Vec<_>>();

    Ok(Figure {
        data: vec![json!({
            "values": values,
            "labels": labels,
            "type": "pie",
        })],
        layout: json!({ "title": format!("Pie Chart of {}", x.name()) }),
    })
}

fn box_plot(ys: &[&Column]) -> Figure {
    let data = ys
        .iter()
        .map(|y| {
            json!({
                "y": y.json_values(),
                "type": "box",
                "name": y.name(),
            })
        })
        .collect();
    Figure {
        data,
        layout: json!({
            "title": format!("Box Plot of {}", joined_names(ys)),
            "xaxis": { "title": "Variables" },
            "yaxis": { "title": "Values" },
        }),
    }
}

fn xy_traces(plot_type: PlotType, x: &Column, ys: &[&Column]) -> Figure {
    let x_values = Value::Array(x.json_values());
    let data = ys
        .iter()
        .map(|y| {
            let mut trace = json!({
                "x": x_values,
                "y": y.json_values(),
                "name": y.name(),
            });
            let style = match plot_type {
                PlotType::Bar => json!({ "type": "bar" }),
                PlotType::Line => json!({ "type": "scatter", "mode": "lines" }),
                PlotType::Area => json!({ "type": "scatter", "mode": "lines", "fill": "tozeroy" }),
                _ => json!({ "type": "scatter", "mode": "markers" }),
            };
            merge(&mut trace, style);
            trace
        })
        .collect();
    Figure {
        data,
        layout: json!({
            "title": format!("{} vs {}", joined_names(ys), x.name()),
            "xaxis": { "title": x.name() },
            "yaxis": { "title": "Values" },
        }),
    }
}

/// Mean pivot after filling nulls with zero.
///
/// One y axis: rows are the distinct x values, a single value column.
/// Two or more y axes: values of `ys[0]`, rows by x, columns by `ys[1]`,
/// empty cells zero.
fn heatmap(x: &Column, ys: &[&Column]) -> Result<Figure, AnalyticsError> {
    let x = x.filled_with_zero();
    let values = ys[0].filled_with_zero();
    if !values.is_numeric() {
        return Err(AnalyticsError::HeatmapNotNumeric(values.name().to_string()));
    }

    let (data, layout) = if ys.len() == 1 {
        let mut sums: BTreeMap<CellKey, (f64, u32)> = BTreeMap::new();
        for (key, value) in keyed_values(&x, &values) {
            let slot = sums.entry(key).or_insert((0.0, 0));
            slot.0 += value;
            slot.1 += 1;
        }
        let z = sums
            .values()
            .map(|(sum, count)| json!([float_json(sum / f64::from(*count))]))
            .collect::<Vec<_>>();
        let rows = sums.keys().map(|key| x.key_json(key)).collect::<Vec<_>>();
        (
            json!({
                "z": z,
                "x": [values.name()],
                "y": rows,
                "type": "heatmap",
                "colorscale": HEATMAP_COLORSCALE,
                "showscale": true,
            }),
            json!({
                "title": format!("Heatmap of {} by {}", values.name(), x.name()),
                "xaxis": { "title": values.name() },
                "yaxis": { "title": x.name() },
                "height": 500,
                "width": 800,
            }),
        )
    } else {
        let across = ys[1].filled_with_zero();
        let mut sums: BTreeMap<(CellKey, CellKey), (f64, u32)> = BTreeMap::new();
        let mut column_keys: BTreeSet<CellKey> = BTreeSet::new();
        let mut row_keys: BTreeSet<CellKey> = BTreeSet::new();
        for ((row_key, value), column_key) in keyed_values(&x, &values).zip(
            across
                .cells()
                .iter()
                .map(|cell| cell.clone().unwrap_or(CellKey::Number(0.0))),
        ) {
            row_keys.insert(row_key.clone());
            column_keys.insert(column_key.clone());
            let slot = sums.entry((row_key, column_key)).or_insert((0.0, 0));
            slot.0 += value;
            slot.1 += 1;
        }
        let z = row_keys
            .iter()
            .map(|row_key| {
                column_keys
                    .iter()
                    .map(|column_key| {
                        sums.get(&(row_key.clone(), column_key.clone()))
                            .map_or(float_json(0.0), |(sum, count)| float_json(sum / f64::from(*count)))
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        (
            json!({
                "z": z,
                "x": column_keys.iter().map(|key| across.key_json(key)).collect::<Vec<_>>(),
                "y": row_keys.iter().map(|key| x.key_json(key)).collect::<Vec<_>>(),
                "type": "heatmap",
                "colorscale": HEATMAP_COLORSCALE,
                "showscale": true,
            }),
            json!({
                "title": format!(
                    "Heatmap of {} by {} and {}",
                    values.name(),
                    x.name(),
                    across.name()
                ),
                "xaxis": { "title": across.name() },
                "yaxis": { "title": x.name() },
                "height": 500,
                "width": 800,
            }),
        )
    };

    Ok(Figure {
        data: vec![data],
        layout,
    })
}

/// Pairs each row's key in `keys` with the numeric cell of `values`.
fn keyed_values<'a>(
    keys: &'a Column,
    values: &'a Column,
) -> impl Iterator<Item = (CellKey, f64)> + 'a {
    keys.cells()
        .iter()
        .zip(values.cells())
        .map(|(key, value)| {
            (
                key.clone().unwrap_or(CellKey::Number(0.0)),
                value.as_ref().and_then(CellKey::as_number).unwrap_or(0.0),
            )
        })
}

fn joined_names(columns: &[&Column]) -> String {
    columns
        .iter()
        .map(|column| column.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn merge(target: &mut Value, extra: Value) {
    if let (Value::Object(target), Value::Object(extra)) = (target, extra) {
        target.extend(extra);
    }
}
