//! Grouped row counts per column.

use crate::analytics::table::{CellKey, CsvTable};
use crate::analytics::AnalyticsError;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Counts rows per distinct value for each requested column.
///
/// Returns `{column: [{column: value, count}, ...]}` with groups in
/// ascending value order. Null cells form no group.
pub fn group_counts(table: &CsvTable, columns: &[String]) -> Result<Value, AnalyticsError> {
    if columns.is_empty() {
        return Err(AnalyticsError::MissingGroupByParameters);
    }

    let mut results = Map::new();
    for name in columns {
        let column = table
            .column(name)
            .ok_or_else(|| AnalyticsError::InvalidColumn(name.clone()))?;

        let mut counts: BTreeMap<&CellKey, u64> = BTreeMap::new();
        for key in column.cells().iter().flatten() {
            *counts.entry(key).or_default() += 1;
        }

        let groups = counts
            .into_iter()
            .map(|(key, count)| {
                let mut group = Map::new();
                group.insert(name.clone(), column.key_json(key));
                group.insert("count".to_string(), json!(count));
                Value::Object(group)
            })
            .collect();
        results.insert(name.clone(), Value::Array(groups));
    }
    Ok(Value::Object(results))
}

#[cfg(test)]
mod tests {
    use super::group_counts;
    use crate::analytics::table::CsvTable;
    use crate::analytics::AnalyticsError;
    use serde_json::json;

    #[test]
    fn counts_are_sorted_by_group_value() {
        let table = CsvTable::parse(b"team,size\nb,10\na,2\nb,10\n,3\n").unwrap();
        let grouped = group_counts(&table, &["team".to_string(), "size".to_string()]).unwrap();
        assert_eq!(
            grouped,
            json!({
                "team": [{"team": "a", "count": 1}, {"team": "b", "count": 2}],
                "size": [
                    {"size": 2, "count": 1},
                    {"size": 3, "count": 1},
                    {"size": 10, "count": 2}
                ],
            })
        );
    }

    #[test]
    fn unknown_column_and_empty_request_are_rejected() {
        let table = CsvTable::parse(b"team\na\n").unwrap();
        assert_eq!(
            group_counts(&table, &[]),
            Err(AnalyticsError::MissingGroupByParameters)
        );
        assert_eq!(
            group_counts(&table, &["dept".to_string()]),
            Err(AnalyticsError::InvalidColumn("dept".to_string()))
        );
    }
}
