//! Column mapping: suggest one from headers, bind it to a file, apply it to rows

use std::collections::HashMap;

use super::parse::RawRow;
use crate::domain::field_mappings::{ColumnMapping, UnitField};

/// Known spellings of each field, compared after [`normalize_header`]
const ALIASES: &[(UnitField, &[&str])] = &[
    (
        UnitField::UnitNumber,
        &[
            "unit_number", "unit", "unit_no", "unit_id", "unit_code", "number", "no", "apartment",
            "apartment_number", "apt", "apt_no", "flat", "flat_no", "lot", "ref", "reference",
        ],
    ),
    (UnitField::Building, &["building", "building_name", "block", "tower", "bldg", "house"]),
    (UnitField::Layout, &["layout", "unit_type", "type", "plan", "floor_plan", "typology"]),
    (UnitField::Floor, &["floor", "level", "storey", "floor_number", "floor_no"]),
    (UnitField::Bedrooms, &["bedrooms", "bedroom", "beds", "bed", "br", "rooms"]),
    (UnitField::Bathrooms, &["bathrooms", "bathroom", "baths", "bath", "ba", "wc"]),
    (
        UnitField::Area,
        &["area", "size", "sqm", "m2", "total_area", "area_m2", "area_sqm", "surface", "living_area"],
    ),
    (
        UnitField::Price,
        &["price", "list_price", "total_price", "asking_price", "amount", "cost"],
    ),
    (UnitField::Currency, &["currency", "ccy", "cur"]),
    (UnitField::Status, &["status", "availability", "state", "sales_status"]),
    (UnitField::View, &["view", "views"]),
    (UnitField::Orientation, &["orientation", "aspect", "facing", "exposure"]),
];

/// `"Unit No."` and `"unit_no"` both become `"unitno"`
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Guess a mapping from column names. Exact alias matches win; then a column
/// that starts with a long alias (`Price (EUR)`) is accepted. Each field is
/// used at most once, by the first matching column.
pub fn suggest_mapping(headers: &[String]) -> ColumnMapping {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut mapping = ColumnMapping::new();
    let mut taken: Vec<UnitField> = Vec::new();

    let mut assign = |matches: &dyn Fn(&str, &str) -> bool, mapping: &mut ColumnMapping| {
        for (header, norm) in headers.iter().zip(&normalized) {
            if norm.is_empty() || mapping.contains_key(header) {
                continue;
            }
            let found = ALIASES.iter().find(|(field, aliases)| {
                !taken.contains(field)
                    && aliases
                        .iter()
                        .any(|alias| matches(norm, &normalize_header(alias)))
            });
            if let Some((field, _)) = found {
                taken.push(*field);
                mapping.insert(header.clone(), *field);
            }
        }
    };

    assign(&|norm, alias| norm == alias, &mut mapping);
    assign(
        &|norm, alias| alias.len() >= 4 && norm.starts_with(alias),
        &mut mapping,
    );
    mapping
}

/// Columns of the file that the mapping does not use
pub fn unmapped_columns(headers: &[String], mapping: &ColumnMapping) -> Vec<String> {
    headers
        .iter()
        .filter(|h| !mapping.contains_key(*h))
        .cloned()
        .collect()
}

/// A mapping resolved against the actual header spelling of a file
#[derive(Debug, Clone)]
pub struct BoundMapping {
    pub columns: Vec<(String, UnitField)>,
    /// Mapped columns absent from the file
    pub missing: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("column '{0}' mapped to unit_number is not present in the file")]
pub struct MissingUnitNumberColumn(pub String);

/// Match mapping keys to file headers, ignoring case and surrounding spaces
pub fn bind(mapping: &ColumnMapping, headers: &[String]) -> Result<BoundMapping, MissingUnitNumberColumn> {
    let mut columns = Vec::with_capacity(mapping.len());
    let mut missing = Vec::new();

    for (column, field) in mapping {
        let wanted = column.trim().to_lowercase();
        match headers.iter().find(|h| h.trim().to_lowercase() == wanted) {
            Some(header) => columns.push((header.clone(), *field)),
            None if *field == UnitField::UnitNumber => {
                return Err(MissingUnitNumberColumn(column.clone()))
            }
            None => missing.push(column.clone()),
        }
    }

    Ok(BoundMapping { columns, missing })
}

/// Field values of one row; blank cells are left out
pub type MappedRow = HashMap<UnitField, String>;

pub fn apply(bound: &BoundMapping, row: &RawRow) -> MappedRow {
    bound
        .columns
        .iter()
        .filter_map(|(column, field)| {
            let value = row.get(column)?.trim();
            (!value.is_empty()).then(|| (*field, value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn suggests_common_spreadsheet_headers() {
        let h = headers(&["Apt No.", "Block", "Floor", "Beds", "Size (m2)", "Price (EUR)", "Status", "Notes"]);
        let m = suggest_mapping(&h);
        assert_eq!(m["Apt No."], UnitField::UnitNumber);
        assert_eq!(m["Block"], UnitField::Building);
        assert_eq!(m["Floor"], UnitField::Floor);
        assert_eq!(m["Beds"], UnitField::Bedrooms);
        assert_eq!(m["Size (m2)"], UnitField::Area);
        assert_eq!(m["Price (EUR)"], UnitField::Price);
        assert_eq!(m["Status"], UnitField::Status);
        assert!(!m.contains_key("Notes"));
        assert_eq!(unmapped_columns(&h, &m), vec!["Notes".to_string()]);
    }

    #[test]
    fn each_field_is_suggested_once() {
        let h = headers(&["Unit", "Number", "Price", "Price net"]);
        let m = suggest_mapping(&h);
        assert_eq!(m["Unit"], UnitField::UnitNumber);
        assert!(!m.contains_key("Number"));
        assert_eq!(m["Price"], UnitField::Price);
        assert!(!m.contains_key("Price net"));
    }

    #[test]
    fn bind_ignores_case_and_reports_missing() {
        let mut mapping = ColumnMapping::new();
        mapping.insert("unit".into(), UnitField::UnitNumber);
        mapping.insert("Price".into(), UnitField::Price);
        mapping.insert("View".into(), UnitField::View);

        let bound = bind(&mapping, &headers(&["UNIT", " price "])).unwrap();
        assert_eq!(bound.columns.len(), 2);
        assert_eq!(bound.missing, vec!["View".to_string()]);

        let err = bind(&mapping, &headers(&["Price"])).unwrap_err();
        assert_eq!(err, MissingUnitNumberColumn("unit".into()));
    }

    #[test]
    fn apply_drops_blank_cells() {
        let mut mapping = ColumnMapping::new();
        mapping.insert("No".into(), UnitField::UnitNumber);
        mapping.insert("Price".into(), UnitField::Price);
        let bound = bind(&mapping, &headers(&["No", "Price", "Other"])).unwrap();

        let row: RawRow = [("No", " A-1 "), ("Price", "  "), ("Other", "x")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mapped = apply(&bound, &row);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[&UnitField::UnitNumber], "A-1");
    }
}
