//! In-memory CSV table with per-column typing.
//!
//! A column is numeric when every non-null cell parses as a finite `f64`;
//! otherwise every non-null cell is kept as text. Empty cells and the usual
//! NA markers are null.

use crate::analytics::AnalyticsError;
use serde_json::{Number, Value};
use std::cmp::Ordering;

const NA_MARKERS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// Typed cell value usable as a grouping key.
///
/// Ordering puts every number before every text value; numbers use IEEE
/// total order.
#[derive(Debug, Clone)]
pub enum CellKey {
    Number(f64),
    Text(String),
}

impl CellKey {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl PartialEq for CellKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CellKey {}

impl PartialOrd for CellKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(left), Self::Number(right)) => left.total_cmp(right),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    cells: Vec<Option<CellKey>>,
    numeric: bool,
    integral: bool,
}

impl Column {
    fn from_raw(name: String, raw: Vec<Option<String>>) -> Self {
        let numeric = raw
            .iter()
            .flatten()
            .all(|cell| parse_finite(cell).is_some());
        let integral = numeric && raw.iter().flatten().all(|cell| cell.trim().parse::<i64>().is_ok());

        let cells = raw
            .into_iter()
            .map(|cell| {
                cell.map(|text| match parse_finite(&text) {
                    Some(value) if numeric => CellKey::Number(value),
                    _ => CellKey::Text(text),
                })
            })
            .collect();

        Self {
            name,
            cells,
            numeric,
            integral,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric
    }

    pub fn cells(&self) -> &[Option<CellKey>] {
        &self.cells
    }

    /// Copy with null cells replaced by zero.
    pub fn filled_with_zero(&self) -> Self {
        let cells = self
            .cells
            .iter()
            .map(|cell| Some(cell.clone().unwrap_or(CellKey::Number(0.0))))
            .collect::<Vec<_>>();
        let numeric = cells
            .iter()
            .flatten()
            .all(|cell| matches!(cell, CellKey::Number(_)));
        Self {
            name: self.name.clone(),
            cells,
            numeric,
            integral: numeric && self.integral,
        }
    }

    /// JSON rendering of every cell; nulls become `null`.
    pub fn json_values(&self) -> Vec<Value> {
        self.cells
            .iter()
            .map(|cell| match cell {
                Some(key) => self.key_json(key),
                None => Value::Null,
            })
            .collect()
    }

    /// JSON rendering of one key with this column's number style.
    pub fn key_json(&self, key: &CellKey) -> Value {
        match key {
            CellKey::Number(value) if self.integral && value.fract() == 0.0 => {
                Value::from(*value as i64)
            }
            CellKey::Number(value) => float_json(*value),
            CellKey::Text(text) => Value::String(text.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    columns: Vec<Column>,
    row_count: usize,
}

impl CsvTable {
    /// Parses CSV bytes with a mandatory header row.
    ///
    /// Short rows are padded with nulls; rows longer than the header are an
    /// error.
    pub fn parse(bytes: &[u8]) -> Result<Self, AnalyticsError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let header = reader
            .headers()?
            .iter()
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();
        if header.is_empty() || header.iter().all(String::is_empty) {
            return Err(AnalyticsError::EmptyHeader);
        }

        let mut raw_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); header.len()];
        let mut row_count = 0usize;
        for record in reader.records() {
            let record = record?;
            if record.len() > header.len() {
                return Err(AnalyticsError::Csv(format!(
                    "row {} has {} fields, header has {}",
                    row_count + 1,
                    record.len(),
                    header.len()
                )));
            }
            for (index, column) in raw_columns.iter_mut().enumerate() {
                column.push(record.get(index).and_then(normalize_cell));
            }
            row_count += 1;
        }

        let columns = header
            .into_iter()
            .zip(raw_columns)
            .map(|(name, raw)| Column::from_raw(name, raw))
            .collect();
        Ok(Self { columns, row_count })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.name.clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

pub(crate) fn float_json(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn normalize_cell(raw: &str) -> Option<String> {
    if raw.is_empty() || NA_MARKERS.contains(&raw.trim()) {
        None
    } else {
        Some(raw.to_string())
    }
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}
