//! Row presentation helpers: columns, quick filter, paging, export, NVFIX

use crate::protocol::Row;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::borrow::Borrow;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: usize = 100;

static NVFIX_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("nvfix number pattern is valid"));

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export file at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize JSON export: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lower sorts first; unknown fields get 10
pub fn column_priority(field: &str) -> u8 {
    match field.to_lowercase().as_str() {
        "symbol" | "order_id" | "trade_id" | "account_id" | "id" => 1,
        "price" | "quantity" | "volume" | "balance" | "notional" => 2,
        "bid" | "ask" | "side" | "status" => 3,
        "timestamp" | "last_update_time" | "last_trade_time" => 4,
        "venue" | "currency" | "trader_id" => 5,
        _ => 10,
    }
}

/// Union of fields across rows, by priority then first appearance
pub fn derive_columns<R: Borrow<Row>>(rows: &[R]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for field in row.borrow().keys() {
            if !columns.iter().any(|c| c == field) {
                columns.push(field.clone());
            }
        }
    }
    // stable sort keeps first-appearance order within a priority
    columns.sort_by_key(|c| column_priority(c));
    columns
}

/// `last_trade_time` → `Last Trade Time`
pub fn format_header_name(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cell text: strings raw, null and missing empty, everything else as compact JSON
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Rows with any rendered value containing `needle`, case-insensitively
pub fn quick_filter<'a>(rows: &'a [Row], needle: &str) -> Vec<&'a Row> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return rows.iter().collect();
    }
    rows.iter()
        .filter(|row| {
            row.values()
                .any(|v| render_value(Some(v)).to_lowercase().contains(&needle))
        })
        .collect()
}

pub fn page<R>(rows: &[R], page_index: usize, page_size: usize) -> &[R] {
    let page_size = page_size.max(1);
    let start = page_index.saturating_mul(page_size).min(rows.len());
    let end = start.saturating_add(page_size).min(rows.len());
    &rows[start..end]
}

pub fn page_count(total_rows: usize, page_size: usize) -> usize {
    total_rows.div_ceil(page_size.max(1))
}

/// `amps-data-YYYY-MM-DD.{extension}`
pub fn default_export_file_name(date: NaiveDate, extension: &str) -> String {
    format!("amps-data-{}.{}", date.format("%Y-%m-%d"), extension)
}

pub fn rows_to_csv<R: Borrow<Row>>(rows: &[R]) -> String {
    let columns = derive_columns(rows);
    let mut content = columns
        .iter()
        .map(|c| csv_escape(c))
        .collect::<Vec<_>>()
        .join(",");
    content.push('\n');

    for row in rows {
        let row = row.borrow();
        let values: Vec<String> = columns
            .iter()
            .map(|c| csv_escape(&render_value(row.get(c))))
            .collect();
        content.push_str(&values.join(","));
        content.push('\n');
    }
    content
}

pub fn export_rows_to_csv<R: Borrow<Row>>(path: &Path, rows: &[R]) -> Result<usize, ExportError> {
    write_export(path, rows_to_csv(rows))?;
    Ok(rows.len())
}

pub fn export_rows_to_json<R: Borrow<Row>>(path: &Path, rows: &[R]) -> Result<usize, ExportError> {
    let records: Vec<&Row> = rows.iter().map(Borrow::borrow).collect();
    let payload = serde_json::to_string_pretty(&records)?;
    write_export(path, payload)?;
    Ok(rows.len())
}

fn write_export(path: &Path, content: String) -> Result<(), ExportError> {
    fs::write(path, content).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// `a=1&b=x` → `{"a": 1, "b": "x"}`
pub fn parse_nvfix(payload: &str) -> Row {
    let mut row = Row::new();
    for pair in payload.split('&') {
        let Some(eq) = pair.find('=').filter(|i| *i > 0) else {
            continue;
        };
        let (key, value) = (&pair[..eq], &pair[eq + 1..]);
        row.insert(key.to_string(), nvfix_value(value));
    }
    row
}

/// Expand a row whose NVFIX payload was wrapped under `value` into its
/// fields. Other fields of the row (the SOW key) are kept and win on clashes.
pub fn expand_nvfix_row(row: &Row) -> Row {
    let Some(Value::String(payload)) = row.get("value") else {
        return row.clone();
    };
    let mut expanded = parse_nvfix(payload);
    if expanded.is_empty() {
        return row.clone();
    }
    for (field, value) in row.iter().filter(|(field, _)| field.as_str() != "value") {
        expanded.insert(field.clone(), value.clone());
    }
    expanded
}

fn nvfix_value(raw: &str) -> Value {
    if NVFIX_NUMBER.is_match(raw) {
        if let Ok(n) = raw.parse::<u64>() {
            return Value::Number(n.into());
        }
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn rows() -> Vec<Row> {
        vec![
            json!({"note": "a, b", "price": 10.5, "symbol": "GSK", "key": "GSK"}),
            json!({"symbol": "VOD", "venue": "LSE", "meta": {"x": 1}}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
    }

    #[test]
    fn test_columns_ordered_by_priority_then_appearance() {
        let columns = derive_columns(&rows());
        assert_eq!(columns, vec!["symbol", "price", "venue", "key", "note", "meta"]);
    }

    #[test]
    fn test_header_names() {
        assert_eq!(format_header_name("last_trade_time"), "Last Trade Time");
        assert_eq!(format_header_name("id"), "Id");
    }

    #[test]
    fn test_quick_filter_matches_any_field() {
        let data = rows();
        assert_eq!(quick_filter(&data, "lse").len(), 1);
        assert_eq!(quick_filter(&data, "10.5").len(), 1);
        assert_eq!(quick_filter(&data, "").len(), 2);
        assert!(quick_filter(&data, "nyse").is_empty());
    }

    #[test]
    fn test_paging() {
        let data: Vec<u32> = (0..250).collect();
        assert_eq!(page(&data, 0, DEFAULT_PAGE_SIZE).len(), 100);
        assert_eq!(page(&data, 2, DEFAULT_PAGE_SIZE), &data[200..250]);
        assert!(page(&data, 5, DEFAULT_PAGE_SIZE).is_empty());
        assert_eq!(page_count(250, 100), 3);
        assert_eq!(page_count(0, 100), 0);
    }

    #[test]
    fn test_csv_export_escapes_and_renders_nested() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("rows.csv");
        let written = export_rows_to_csv(&path, &rows()).expect("csv export failed");
        assert_eq!(written, 2);

        let output = fs::read_to_string(path).expect("failed to read csv output");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "symbol,price,venue,key,note,meta");
        assert_eq!(lines[1], "GSK,10.5,,GSK,\"a, b\",");
        assert_eq!(lines[2], "VOD,,LSE,,,\"{\"\"x\"\":1}\"");
    }

    #[test]
    fn test_json_export() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("rows.json");
        let filtered = quick_filter(&rows(), "VOD").into_iter().cloned().collect::<Vec<_>>();
        export_rows_to_json(&path, &filtered).expect("json export failed");

        let parsed: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["meta"]["x"], 1);
    }

    #[test]
    fn test_default_export_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(default_export_file_name(date, "csv"), "amps-data-2024-03-07.csv");
    }

    #[test]
    fn test_expand_nvfix_row() {
        let wrapped = json!({"value": "55=GSK&44=10.25", "key": "GSK"});
        let row = expand_nvfix_row(wrapped.as_object().unwrap());
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({"55": "GSK", "44": 10.25, "key": "GSK"})
        );

        // rows that are not NVFIX text pass through
        let plain = json!({"value": "no pairs here", "key": "1"});
        assert_eq!(&expand_nvfix_row(plain.as_object().unwrap()), plain.as_object().unwrap());
        let object = json!({"symbol": "VOD"});
        assert_eq!(&expand_nvfix_row(object.as_object().unwrap()), object.as_object().unwrap());
    }

    #[test]
    fn test_parse_nvfix() {
        let row = parse_nvfix("35=D&55=GSK&44=10.25&=skip&novalue&54=");
        assert_eq!(row["35"], json!("D"));
        assert_eq!(row["55"], json!("GSK"));
        assert_eq!(row["44"], json!(10.25));
        assert_eq!(row["54"], json!(""));
        assert_eq!(row.len(), 4);
        assert_eq!(parse_nvfix("a=1")["a"], json!(1));
    }
}
