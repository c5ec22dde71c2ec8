//! Turn CSV text or a JSON array into header-keyed string rows

use serde_json::Value;
use std::collections::HashMap;

/// One input record, keyed by source column name. Missing cells are absent.
pub type RawRow = HashMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct ParsedTable {
    /// Source column names
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("file contains no data rows")]
    Empty,
    #[error("file has more than {max} rows")]
    TooManyRows { max: usize },
    #[error("duplicate column '{0}'")]
    DuplicateHeader(String),
    #[error("invalid CSV: {0}")]
    Csv(String),
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("JSON import must be an array of objects (item {0} is not an object)")]
    NotAnObject(usize),
}

/// Pick `,`, `;` or tab by counting them on the header line
fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().next().unwrap_or_default();
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| first.bytes().filter(|b| b == d).count())
        .filter(|d| first.as_bytes().contains(d))
        .unwrap_or(b',')
}

pub fn parse_csv(text: &str, max_rows: usize) -> Result<ParsedTable, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::Csv(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    check_headers(&headers)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::Csv(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if rows.len() == max_rows {
            return Err(ParseError::TooManyRows { max: max_rows });
        }
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, cell)| (header.clone(), cell.to_string()))
            .collect();
        rows.push(row);
    }

    finish(headers, rows)
}

fn check_headers(headers: &[String]) -> Result<(), ParseError> {
    let mut seen = std::collections::HashSet::new();
    for h in headers.iter().filter(|h| !h.is_empty()) {
        if !seen.insert(h.to_lowercase()) {
            return Err(ParseError::DuplicateHeader(h.clone()));
        }
    }
    Ok(())
}

/// Scalars become their display text; nulls are dropped; nested values keep JSON text
fn cell_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn parse_json_value(value: Value, max_rows: usize) -> Result<ParsedTable, ParseError> {
    let Value::Array(items) = value else {
        return Err(ParseError::Json("expected an array".into()));
    };
    if items.len() > max_rows {
        return Err(ParseError::TooManyRows { max: max_rows });
    }

    let mut headers: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(object) = item else {
            return Err(ParseError::NotAnObject(index + 1));
        };
        let mut row = RawRow::with_capacity(object.len());
        for (key, value) in object {
            let key = key.trim().to_string();
            if key.is_empty() {
                continue;
            }
            if !headers.contains(&key) {
                headers.push(key.clone());
            }
            if let Some(text) = cell_text(value) {
                row.insert(key, text);
            }
        }
        rows.push(row);
    }

    check_headers(&headers)?;
    finish(headers, rows)
}

pub fn parse_json_text(text: &str, max_rows: usize) -> Result<ParsedTable, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let value: Value = serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))?;
    parse_json_value(value, max_rows)
}

fn finish(headers: Vec<String>, rows: Vec<RawRow>) -> Result<ParsedTable, ParseError> {
    if rows.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(ParsedTable {
        headers: headers.into_iter().filter(|h| !h.is_empty()).collect(),
        rows,
    })
}

impl ParsedTable {
    /// First `n` rows as JSON objects, for previews
    pub fn sample(&self, n: usize) -> Vec<serde_json::Map<String, Value>> {
        self.rows
            .iter()
            .take(n)
            .map(|row| {
                self.headers
                    .iter()
                    .map(|h| {
                        let v = row.get(h).cloned().map(Value::String).unwrap_or(Value::Null);
                        (h.clone(), v)
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn csv_with_bom_and_semicolons() {
        let text = "\u{feff}Unit;Price;Status\nA-1; 120 000 ;available\n\nA-2;;sold\n";
        let table = parse_csv(text, 10).unwrap();
        assert_eq!(table.headers, vec!["Unit", "Price", "Status"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["Price"], "120 000");
        assert_eq!(table.rows[1]["Price"], "");
    }

    #[test]
    fn csv_short_rows_are_allowed() {
        let table = parse_csv("unit,floor,price\nB1,2\n", 10).unwrap();
        assert_eq!(table.rows[0].get("price"), None);
        assert_eq!(table.rows[0]["floor"], "2");
    }

    #[test]
    fn csv_quoted_commas() {
        let table = parse_csv("unit,view\n\"C1\",\"sea, park\"\n", 10).unwrap();
        assert_eq!(table.rows[0]["view"], "sea, park");
    }

    #[test]
    fn row_cap_is_enforced() {
        let text = "unit\nA\nB\nC\n";
        assert_eq!(parse_csv(text, 2).unwrap_err(), ParseError::TooManyRows { max: 2 });
        assert!(parse_csv(text, 3).is_ok());

        let json = json!([{ "unit": "A" }, { "unit": "B" }]);
        assert_eq!(
            parse_json_value(json, 1).unwrap_err(),
            ParseError::TooManyRows { max: 1 }
        );
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        assert_eq!(
            parse_csv("Unit,unit\nA,B\n", 10).unwrap_err(),
            ParseError::DuplicateHeader("unit".into())
        );
    }

    #[test]
    fn empty_input() {
        assert_eq!(parse_csv("unit,price\n", 10).unwrap_err(), ParseError::Empty);
        assert_eq!(parse_json_text("[]", 10).unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn json_objects_collect_headers() {
        let table = parse_json_value(
            json!([
                { "unit": "A1", "price": 100000, "floor": null },
                { "unit": "A2", "balcony": true }
            ]),
            10,
        )
        .unwrap();
        assert_eq!(table.headers.len(), 4);
        assert!(table.headers.contains(&"balcony".to_string()));
        assert_eq!(table.rows[0]["price"], "100000");
        assert!(!table.rows[0].contains_key("floor"));
        assert_eq!(table.rows[1]["balcony"], "true");
    }

    #[test]
    fn json_items_must_be_objects() {
        assert_eq!(
            parse_json_text(r#"[{"unit":"A"}, 3]"#, 10).unwrap_err(),
            ParseError::NotAnObject(2)
        );
        assert!(matches!(parse_json_text("{", 10), Err(ParseError::Json(_))));
    }

    #[test]
    fn sample_takes_leading_rows() {
        let table = parse_csv("unit,price\nA,1\nB,\nC,3\n", 10).unwrap();
        let sample = table.sample(2);
        assert_eq!(sample.len(), 2);
        assert_eq!(sample[0]["unit"], json!("A"));
        assert_eq!(sample[1]["price"], json!(""));
    }
}
