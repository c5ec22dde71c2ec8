//! Per-row typing and validation of mapped import rows

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use super::mapping::MappedRow;
use crate::domain::field_mappings::UnitField;
use crate::domain::imports::RowError;
use crate::domain::units::UnitStatus;

/// A validated row. `None` means the file did not provide the value, so
/// updates leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitDraft {
    /// 1-based data row number in the source file
    pub row: usize,
    pub unit_number: String,
    pub building: Option<String>,
    pub layout: Option<String>,
    pub floor: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<Decimal>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub status: Option<UnitStatus>,
    pub view: Option<String>,
    pub orientation: Option<String>,
}

impl UnitDraft {
    /// Case-insensitive identity within a project
    pub fn key(&self) -> String {
        self.unit_number.to_lowercase()
    }
}

/// Parse human-entered numbers: `1 250 000`, `1,250,000.50`, `1.250.000,50`,
/// `85,5`, `€ 120000`. Whitespace, `_`, `'` and currency signs are ignored.
/// With both `,` and `.` present the last one is the decimal separator; a
/// lone `,` groups thousands when every group after a 1-3 digit lead has
/// exactly three digits (`250,000`); otherwise it is the decimal separator.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '\'' | '€' | '$' | '£'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => {
            let groups: Vec<&str> = cleaned.split(',').collect();
            let lead = groups[0].trim_start_matches('-');
            let grouping = (1..=3).contains(&lead.len())
                && groups[1..].iter().all(|g| g.len() == 3);
            if grouping {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// Whole numbers; `2.0` is accepted, `2.5` is not
pub fn parse_int(raw: &str) -> Option<i32> {
    let d = parse_decimal(raw)?;
    if !d.fract().is_zero() {
        return None;
    }
    d.to_i32()
}

/// Floor numbers also accept ground-floor markers
fn parse_floor(raw: &str) -> Option<i32> {
    match raw.trim().to_lowercase().as_str() {
        "g" | "gf" | "ground" | "ground floor" | "eg" => Some(0),
        "b" | "basement" => Some(-1),
        other => parse_int(other),
    }
}

struct RowCheck<'a> {
    row: usize,
    values: &'a MappedRow,
    errors: Vec<RowError>,
}

impl<'a> RowCheck<'a> {
    fn text(&self, field: UnitField, max: usize) -> Option<String> {
        self.values.get(&field).map(|v| v.chars().take(max).collect())
    }

    fn parsed<T>(&mut self, field: UnitField, parse: impl Fn(&str) -> Option<T>, what: &str) -> Option<T> {
        let raw = self.values.get(&field)?;
        match parse(raw) {
            Some(v) => Some(v),
            None => {
                self.errors.push(RowError::new(
                    self.row,
                    field.as_str(),
                    format!("'{raw}' is not {what}"),
                ));
                None
            }
        }
    }

    fn fail(&mut self, field: UnitField, message: impl Into<String>) {
        self.errors.push(RowError::new(self.row, field.as_str(), message));
    }
}

/// Type one mapped row. Returns every problem found, not just the first.
pub fn validate_row(row: usize, values: &MappedRow) -> Result<UnitDraft, Vec<RowError>> {
    let mut check = RowCheck {
        row,
        values,
        errors: Vec::new(),
    };

    let unit_number = check.text(UnitField::UnitNumber, usize::MAX).unwrap_or_default();
    if unit_number.is_empty() {
        check.fail(UnitField::UnitNumber, "unit number is required");
    } else if unit_number.chars().count() > 50 {
        check.fail(UnitField::UnitNumber, "unit number must be at most 50 characters");
    }

    let floor = check.parsed(UnitField::Floor, parse_floor, "a floor number");
    if matches!(floor, Some(f) if !(-10..=300).contains(&f)) {
        check.fail(UnitField::Floor, "floor must be between -10 and 300");
    }

    let bedrooms = check.parsed(UnitField::Bedrooms, parse_int, "a whole number");
    let bathrooms = check.parsed(UnitField::Bathrooms, parse_int, "a whole number");
    for (field, value) in [(UnitField::Bedrooms, bedrooms), (UnitField::Bathrooms, bathrooms)] {
        if matches!(value, Some(n) if !(0..=50).contains(&n)) {
            check.fail(field, "must be between 0 and 50");
        }
    }

    let area = check.parsed(UnitField::Area, parse_decimal, "a number");
    if matches!(area, Some(a) if a <= Decimal::ZERO) {
        check.fail(UnitField::Area, "area must be greater than zero");
    }

    let price = check.parsed(UnitField::Price, parse_decimal, "a number");
    if matches!(price, Some(p) if p < Decimal::ZERO) {
        check.fail(UnitField::Price, "price must not be negative");
    }

    let currency = check.text(UnitField::Currency, 10).map(|c| c.to_uppercase());
    if let Some(c) = &currency {
        if c.len() != 3 || !c.chars().all(|ch| ch.is_ascii_uppercase()) {
            check.fail(UnitField::Currency, format!("'{c}' is not a 3-letter currency code"));
        }
    }

    let status = check.parsed(UnitField::Status, UnitStatus::parse_loose, "a known status");

    let draft = UnitDraft {
        row,
        unit_number,
        building: check.text(UnitField::Building, 120),
        layout: check.text(UnitField::Layout, 120),
        floor,
        bedrooms,
        bathrooms,
        area: area.map(|a| a.round_dp(2)),
        price: price.map(|p| p.round_dp(2)),
        currency,
        status,
        view: check.text(UnitField::View, 120),
        orientation: check.text(UnitField::Orientation, 60),
    };

    if check.errors.is_empty() {
        Ok(draft)
    } else {
        Err(check.errors)
    }
}

/// Validated rows plus every error, in row order
#[derive(Debug, Default)]
pub struct Validated {
    pub drafts: Vec<UnitDraft>,
    pub errors: Vec<RowError>,
    /// Rows with at least one error
    pub failed_rows: usize,
}

/// Validate all rows; a unit number seen earlier in the file fails the later row
pub fn validate_rows(rows: &[MappedRow]) -> Validated {
    let mut out = Validated::default();
    let mut first_seen: HashMap<String, usize> = HashMap::new();

    for (index, values) in rows.iter().enumerate() {
        let row = index + 1;
        match validate_row(row, values) {
            Ok(draft) => {
                if let Some(first) = first_seen.get(&draft.key()) {
                    out.errors.push(RowError::new(
                        row,
                        UnitField::UnitNumber.as_str(),
                        format!("unit number '{}' already appears in row {first}", draft.unit_number),
                    ));
                    out.failed_rows += 1;
                    continue;
                }
                first_seen.insert(draft.key(), row);
                out.drafts.push(draft);
            }
            Err(errors) => {
                out.errors.extend(errors);
                out.failed_rows += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn row(pairs: &[(UnitField, &str)]) -> MappedRow {
        pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
    }

    #[test]
    fn decimal_formats() {
        assert_eq!(parse_decimal("1 250 000"), Some(d("1250000")));
        assert_eq!(parse_decimal("1,250,000.50"), Some(d("1250000.50")));
        assert_eq!(parse_decimal("1.250.000,50"), Some(d("1250000.50")));
        assert_eq!(parse_decimal("85,5"), Some(d("85.5")));
        assert_eq!(parse_decimal("1,250"), Some(d("1250")));
        assert_eq!(parse_decimal("250,000"), Some(d("250000")));
        assert_eq!(parse_decimal("-1,500"), Some(d("-1500")));
        assert_eq!(parse_decimal("1250,000"), Some(d("1250.000")));
        assert_eq!(parse_decimal("12,50"), Some(d("12.50")));
        assert_eq!(parse_decimal("€ 120_000"), Some(d("120000")));
        assert_eq!(parse_decimal("1.250.000"), Some(d("1250000")));
        assert_eq!(parse_decimal("-15"), Some(d("-15")));
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("  "), None);
    }

    #[test]
    fn integer_parsing() {
        assert_eq!(parse_int("3"), Some(3));
        assert_eq!(parse_int("2.0"), Some(2));
        assert_eq!(parse_int("2.5"), None);
        assert_eq!(parse_floor("GF"), Some(0));
        assert_eq!(parse_floor("-1"), Some(-1));
    }

    #[test]
    fn valid_row_is_typed() {
        let draft = validate_row(
            1,
            &row(&[
                (UnitField::UnitNumber, "A-101"),
                (UnitField::Floor, "1"),
                (UnitField::Bedrooms, "2"),
                (UnitField::Area, "74,35"),
                (UnitField::Price, "185 000"),
                (UnitField::Currency, "eur"),
                (UnitField::Status, "Booked"),
            ]),
        )
        .unwrap();
        assert_eq!(draft.unit_number, "A-101");
        assert_eq!(draft.area, Some(d("74.35")));
        assert_eq!(draft.price, Some(d("185000")));
        assert_eq!(draft.currency.as_deref(), Some("EUR"));
        assert_eq!(draft.status, Some(UnitStatus::Reserved));
        assert_eq!(draft.building, None);
    }

    #[test]
    fn every_problem_is_reported() {
        let errors = validate_row(
            4,
            &row(&[
                (UnitField::Price, "-5"),
                (UnitField::Bedrooms, "two"),
                (UnitField::Status, "maybe"),
                (UnitField::Currency, "euro"),
            ]),
        )
        .unwrap_err();
        let fields: Vec<_> = errors.iter().filter_map(|e| e.field.as_deref()).collect();
        assert_eq!(fields, vec!["unit_number", "bedrooms", "price", "currency", "status"]);
        assert!(errors.iter().all(|e| e.row == 4));
    }

    #[test]
    fn duplicate_unit_numbers_in_file() {
        let rows = vec![
            row(&[(UnitField::UnitNumber, "A1")]),
            row(&[(UnitField::UnitNumber, "B1")]),
            row(&[(UnitField::UnitNumber, "a1")]),
            row(&[(UnitField::Price, "1")]),
        ];
        let result = validate_rows(&rows);
        assert_eq!(result.drafts.len(), 2);
        assert_eq!(result.failed_rows, 2);
        assert_eq!(result.errors[0].row, 3);
        assert!(result.errors[0].message.contains("row 1"));
        assert_eq!(result.errors[1].row, 4);
    }
}
