//! Ingestion helpers: turning uploaded files into typed columns
//!
//! Parsing and type inference happen here, without a connection. The store
//! only creates the table and inserts what these helpers produce.

use crate::error::{Nl2SqlError, Result};
use crate::sanitizer::policy::SUSPICIOUS_PREFIXES;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

lazy_static! {
    static ref NON_IDENTIFIER: Regex = Regex::new(r"[^A-Za-z0-9_]").unwrap();
}

/// Storage class inferred for a column from its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Narrowest type every non-empty value fits. No values at all means TEXT.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Option<String>>) -> Self {
        let mut seen_any = false;
        let mut inferred = ColumnType::Integer;

        for value in values.into_iter().flatten() {
            seen_any = true;
            let v = value.trim();
            if inferred == ColumnType::Integer && v.parse::<i64>().is_err() {
                inferred = ColumnType::Real;
            }
            if inferred == ColumnType::Real && !v.parse::<f64>().map_or(false, |f| f.is_finite()) {
                return ColumnType::Text;
            }
        }

        if seen_any {
            inferred
        } else {
            ColumnType::Text
        }
    }

    /// Bind a cell under this column's type.
    pub fn to_sql_value(&self, cell: &Option<String>) -> SqlValue {
        let Some(raw) = cell else {
            return SqlValue::Null;
        };
        match self {
            ColumnType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(SqlValue::Integer)
                .unwrap_or_else(|_| SqlValue::Text(raw.clone())),
            ColumnType::Real => raw
                .trim()
                .parse::<f64>()
                .map(SqlValue::Real)
                .unwrap_or_else(|_| SqlValue::Text(raw.clone())),
            ColumnType::Text => SqlValue::Text(raw.clone()),
        }
    }
}

/// Parsed upload: header row plus cells, `None` for missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl TabularData {
    pub fn column_types(&self) -> Vec<ColumnType> {
        (0..self.headers.len())
            .map(|i| ColumnType::infer(self.rows.iter().map(|row| &row[i])))
            .collect()
    }
}

/// Table name from an upload's file name: stem with every non-identifier
/// character replaced by `_`, plus `_` and eight hex chars of a v4 UUID.
/// Stems that start with a digit or a stored-procedure prefix get a `t_` prefix.
pub fn generate_table_name(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut base = NON_IDENTIFIER.replace_all(stem.trim(), "_").into_owned();
    if base.is_empty() {
        base = "table".to_string();
    }
    let lower = base.to_ascii_lowercase();
    if base.starts_with(|c: char| c.is_ascii_digit())
        || SUSPICIOUS_PREFIXES.iter().any(|p| lower.starts_with(*p))
    {
        base = format!("t_{}", base);
    }

    let unique_id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", base, &unique_id[..8])
}

/// Trim header names, name blank ones by position and suffix repeats.
/// SQLite column names are case-insensitive, so `Region` and `region` collide.
pub fn clean_headers(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut headers = Vec::new();

    for (i, name) in raw.into_iter().enumerate() {
        let name = name.trim();
        let base = if name.is_empty() {
            format!("column_{}", i + 1)
        } else {
            name.to_string()
        };

        let mut candidate = base.clone();
        let mut n = 2;
        while !seen.insert(candidate.to_lowercase()) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        headers.push(candidate);
    }

    headers
}

pub fn read_csv(path: &Path) -> Result<TabularData> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| Nl2SqlError::Ingestion(format!("Failed to open {}: {}", path.display(), e)))?;

    let headers = clean_headers(
        reader
            .headers()
            .map_err(|e| Nl2SqlError::Ingestion(format!("Failed to read CSV header: {}", e)))?
            .iter()
            .map(|h| h.to_string()),
    );
    if headers.is_empty() {
        return Err(Nl2SqlError::Ingestion(format!(
            "{} has no columns",
            path.display()
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| Nl2SqlError::Ingestion(format!("Failed to read CSV record: {}", e)))?;
        let mut row: Vec<Option<String>> = record
            .iter()
            .take(headers.len())
            .map(|cell| {
                if cell.trim().is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        row.resize(headers.len(), None);
        rows.push(row);
    }

    Ok(TabularData { headers, rows })
}

/// Rows of a JSON array of objects. Columns are the union of keys, in the
/// order first seen.
pub fn rows_from_json(records: &[Value]) -> Result<TabularData> {
    if records.is_empty() {
        return Err(Nl2SqlError::Ingestion("JSON upload contains no rows".to_string()));
    }

    let mut keys: Vec<String> = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let object = record.as_object().ok_or_else(|| {
            Nl2SqlError::Ingestion(format!("Row {} is not a JSON object", i + 1))
        })?;
        for key in object.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }

    let headers = clean_headers(keys.iter().cloned());
    let rows = records
        .iter()
        .filter_map(|r| r.as_object())
        .map(|object| {
            keys.iter()
                .map(|key| object.get(key).and_then(json_cell))
                .collect()
        })
        .collect();

    Ok(TabularData { headers, rows })
}

pub fn read_json(path: &Path) -> Result<TabularData> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    match value {
        Value::Array(records) => rows_from_json(&records),
        _ => Err(Nl2SqlError::Ingestion(
            "JSON upload must be an array of objects".to_string(),
        )),
    }
}

fn json_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
            .collect()
    }

    #[test]
    fn test_type_inference() {
        assert_eq!(ColumnType::infer(&cells(&["1", "2", ""])), ColumnType::Integer);
        assert_eq!(ColumnType::infer(&cells(&["1", "2.5"])), ColumnType::Real);
        assert_eq!(ColumnType::infer(&cells(&["1.5", "West"])), ColumnType::Text);
        assert_eq!(ColumnType::infer(&cells(&["", ""])), ColumnType::Text);
        assert_eq!(ColumnType::infer(&cells(&["NaN"])), ColumnType::Text);
    }

    #[test]
    fn test_generated_table_names() {
        let name = generate_table_name("sales data-2024.csv");
        assert!(name.starts_with("sales_data_2024_"));
        assert_eq!(name.len(), "sales_data_2024_".len() + 8);
        assert!(name[name.len() - 8..].chars().all(|c| c.is_ascii_hexdigit()));

        assert!(generate_table_name("2024.csv").starts_with("t_2024_"));
        assert!(generate_table_name("sp_500.json").starts_with("t_sp_500_"));
        assert!(generate_table_name("XP_Log.csv").starts_with("t_XP_Log_"));
        assert!(generate_table_name("resp_times.csv").starts_with("resp_times_"));
        assert!(generate_table_name(".csv").starts_with("_csv_"));
        assert!(generate_table_name("").starts_with("table_"));
        assert_ne!(generate_table_name("a.csv"), generate_table_name("a.csv"));
    }

    #[test]
    fn test_clean_headers() {
        let headers = clean_headers(
            [" region ", "Region", "", "amount", "region"]
                .iter()
                .map(|s| s.to_string()),
        );
        assert_eq!(headers, vec!["region", "Region_2", "column_3", "amount", "region_3"]);
    }

    #[test]
    fn test_read_csv_pads_short_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "region,amount,note").unwrap();
        writeln!(file, "West,100.0,first").unwrap();
        writeln!(file, "East,50").unwrap();
        file.flush().unwrap();

        let data = read_csv(file.path()).unwrap();
        assert_eq!(data.headers, vec!["region", "amount", "note"]);
        assert_eq!(data.rows[1], vec![Some("East".to_string()), Some("50".to_string()), None]);
        assert_eq!(
            data.column_types(),
            vec![ColumnType::Text, ColumnType::Real, ColumnType::Text]
        );
    }

    #[test]
    fn test_rows_from_json_unions_keys() {
        let records = vec![
            json!({"region": "West", "amount": 100}),
            json!({"region": "East", "active": true}),
        ];
        let data = rows_from_json(&records).unwrap();
        assert_eq!(data.headers, vec!["region", "amount", "active"]);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0][2], None);
        assert_eq!(data.rows[1][2], Some("1".to_string()));
    }

    #[test]
    fn test_rows_from_json_rejects_non_objects() {
        assert!(matches!(
            rows_from_json(&[json!([1, 2])]),
            Err(Nl2SqlError::Ingestion(_))
        ));
        assert!(matches!(rows_from_json(&[]), Err(Nl2SqlError::Ingestion(_))));
    }
}
