//! Work item loading
//!
//! Items come from a JSON file (an array of objects, or an object with an
//! `items` array) or from a CSV file with a header row.

use std::path::Path;

use serde_json::{Map, Value};
use tokio::fs;

use crate::errors::{FormRunnerError, Result};

pub async fn load_items(path: &Path) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|err| FormRunnerError::io(path, err))?;

    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        parse_csv(&raw)
    } else {
        parse_json(&raw)
    }
}

pub fn parse_json(raw: &str) -> Result<Vec<Value>> {
    let items = match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) => items,
        Value::Object(mut wrapper) => match wrapper.remove("items") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(FormRunnerError::Items(
                    "expected an array or an object with an `items` array".to_string(),
                ))
            }
        },
        _ => {
            return Err(FormRunnerError::Items(
                "expected an array of objects".to_string(),
            ))
        }
    };

    if let Some(position) = items.iter().position(|item| !item.is_object()) {
        return Err(FormRunnerError::Items(format!(
            "item {} is not an object",
            position
        )));
    }
    Ok(items)
}

/// One object per row, keyed by header. Empty cells are `null` and leave the
/// field unset.
pub fn parse_csv(raw: &str) -> Result<Vec<Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());
    let headers = reader.headers()?.clone();

    let mut items = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            row.insert(header.to_string(), value);
        }
        items.push(Value::Object(row));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_array_and_wrapper() {
        let items = parse_json(r#"[{"customer":"Acme"},{"customer":"Globex"}]"#).unwrap();
        assert_eq!(items.len(), 2);

        let wrapped = parse_json(r#"{"items":[{"customer":"Acme","lines":[{"qty":1}]}]}"#).unwrap();
        assert_eq!(wrapped[0]["lines"][0]["qty"], 1);
    }

    #[test]
    fn json_rejects_scalars() {
        let err = parse_json(r#"[{"a":1}, 3]"#).unwrap_err();
        assert!(err.to_string().contains("item 1"));
        assert!(parse_json("42").is_err());
    }

    #[test]
    fn csv_rows_become_objects() {
        let items = parse_csv("customer, reference\nAcme, PO-1\nGlobex,\n").unwrap();
        assert_eq!(items[0], json!({"customer": "Acme", "reference": "PO-1"}));
        assert_eq!(items[1]["reference"], Value::Null);
    }

    #[tokio::test]
    async fn extension_selects_format() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("items.CSV");
        std::fs::write(&csv_path, "customer\nAcme\n").unwrap();
        let items = load_items(&csv_path).await.unwrap();
        assert_eq!(items, vec![json!({"customer": "Acme"})]);

        let missing = load_items(&dir.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(missing, FormRunnerError::Io { .. }));
    }
}
