//! Saved column → unit field mappings for imports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::text_enum;

text_enum! {
    /// Unit attribute an import column can feed
    UnitField {
        UnitNumber => "unit_number",
        Building => "building",
        Layout => "layout",
        Floor => "floor",
        Bedrooms => "bedrooms",
        Bathrooms => "bathrooms",
        Area => "area",
        Price => "price",
        Currency => "currency",
        Status => "status",
        View => "view",
        Orientation => "orientation",
    } default UnitNumber
}

/// Source column name → target field
pub type ColumnMapping = BTreeMap<String, UnitField>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    Empty,
    MissingUnitNumber,
    DuplicateTarget(UnitField),
    BlankColumn,
}

impl std::fmt::Display for MappingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("mapping has no columns"),
            Self::MissingUnitNumber => f.write_str("mapping must include a unit_number column"),
            Self::DuplicateTarget(field) => {
                write!(f, "field '{field}' is mapped from more than one column")
            }
            Self::BlankColumn => f.write_str("column names must not be blank"),
        }
    }
}

/// Structural checks shared by saved and inline mappings
pub fn check_mapping(mapping: &ColumnMapping) -> Result<(), MappingError> {
    if mapping.is_empty() {
        return Err(MappingError::Empty);
    }
    if mapping.keys().any(|column| column.trim().is_empty()) {
        return Err(MappingError::BlankColumn);
    }

    let mut seen = HashSet::new();
    for field in mapping.values() {
        if !seen.insert(*field) {
            return Err(MappingError::DuplicateTarget(*field));
        }
    }

    if !seen.contains(&UnitField::UnitNumber) {
        return Err(MappingError::MissingUnitNumber);
    }
    Ok(())
}

fn validate_mapping(mapping: &ColumnMapping) -> Result<(), ValidationError> {
    check_mapping(mapping).map_err(|e| {
        let mut err = ValidationError::new("mapping");
        err.message = Some(e.to_string().into());
        err
    })
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FieldMappingRow {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub name: String,
    pub mapping: serde_json::Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldMapping {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub name: String,
    pub mapping: ColumnMapping,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<FieldMappingRow> for FieldMapping {
    type Error = serde_json::Error;

    fn try_from(r: FieldMappingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            project_id: r.project_id,
            name: r.name,
            mapping: serde_json::from_value(r.mapping)?,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateFieldMappingRequest {
    /// Omit for a mapping shared across projects
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(custom(function = "validate_mapping"))]
    pub mapping: ColumnMapping,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateFieldMappingRequest {
    #[validate(length(min = 1, max = 120))]
    #[serde(default)]
    pub name: Option<String>,
    #[validate(custom(function = "validate_mapping"))]
    #[serde(default)]
    pub mapping: Option<ColumnMapping>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FieldMappingQuery {
    /// Mappings of this project plus the shared ones
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, UnitField)]) -> ColumnMapping {
        pairs.iter().map(|(c, f)| (c.to_string(), *f)).collect()
    }

    #[test]
    fn valid_mapping() {
        let m = mapping(&[("Apt No", UnitField::UnitNumber), ("Price EUR", UnitField::Price)]);
        assert_eq!(check_mapping(&m), Ok(()));
    }

    #[test]
    fn unit_number_is_required() {
        let m = mapping(&[("Price", UnitField::Price)]);
        assert_eq!(check_mapping(&m), Err(MappingError::MissingUnitNumber));
        assert_eq!(check_mapping(&ColumnMapping::new()), Err(MappingError::Empty));
    }

    #[test]
    fn targets_are_unique() {
        let m = mapping(&[
            ("No", UnitField::UnitNumber),
            ("Price", UnitField::Price),
            ("Price (net)", UnitField::Price),
        ]);
        assert_eq!(check_mapping(&m), Err(MappingError::DuplicateTarget(UnitField::Price)));
    }

    #[test]
    fn request_rejects_bad_mapping() {
        let req: CreateFieldMappingRequest = serde_json::from_value(serde_json::json!({
            "name": "Broker sheet",
            "mapping": { "Price": "price" }
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("mapping"));
    }
}
