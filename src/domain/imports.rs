//! Bulk unit import request/response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::field_mappings::ColumnMapping;
use super::{parse_text, text_enum};

text_enum! {
    ImportFormat {
        Csv => "csv",
        Json => "json",
    } default Csv
}

impl ImportFormat {
    /// Infer from an uploaded file name or content type
    pub fn detect(file_name: Option<&str>, content_type: Option<&str>) -> Option<Self> {
        let ext = file_name
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") | Some("txt") => return Some(Self::Csv),
            Some("json") => return Some(Self::Json),
            _ => {}
        }
        match content_type.map(|c| c.to_ascii_lowercase()) {
            Some(ct) if ct.contains("csv") => Some(Self::Csv),
            Some(ct) if ct.contains("json") => Some(Self::Json),
            _ => None,
        }
    }
}

text_enum! {
    ImportStatus {
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    } default Processing
}

/// Switches controlling reconciliation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Existing unit numbers are updated instead of skipped
    #[serde(default)]
    pub update_existing: bool,
    /// Import the valid rows when some rows fail validation
    #[serde(default = "default_true")]
    pub skip_invalid_rows: bool,
    /// Unknown building names create buildings instead of failing the row
    #[serde(default)]
    pub create_missing_buildings: bool,
    /// Run everything, then roll back
    #[serde(default)]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            update_existing: false,
            skip_invalid_rows: true,
            create_missing_buildings: false,
            dry_run: false,
        }
    }
}

/// Where the column mapping comes from. Neither set means auto-detect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingSource {
    #[serde(default)]
    pub field_mapping_id: Option<Uuid>,
    #[serde(default)]
    pub mapping: Option<ColumnMapping>,
}

/// JSON-body import: `data` holds CSV text, or a JSON array (inline or as text)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ImportRequest {
    pub format: ImportFormat,
    pub data: serde_json::Value,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(flatten)]
    pub mapping: MappingSource,
    #[serde(flatten)]
    pub options: ImportOptions,
}

/// A problem with one input row. `row` is 1-based over data rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row,
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn row_level(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            field: None,
            message: message.into(),
        }
    }
}

/// Outcome of one import run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub buildings_created: usize,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResponse {
    /// `None` for dry runs, which are not recorded
    pub import_id: Option<Uuid>,
    pub dry_run: bool,
    pub mapping: ColumnMapping,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub format: ImportFormat,
    pub headers: Vec<String>,
    pub total_rows: usize,
    pub suggested_mapping: ColumnMapping,
    pub unmapped_columns: Vec<String>,
    pub sample: Vec<serde_json::Map<String, serde_json::Value>>,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UnitImportRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub field_mapping_id: Option<Uuid>,
    pub file_name: Option<String>,
    pub format: String,
    pub status: String,
    pub update_existing: bool,
    pub total_rows: i32,
    pub created_count: i32,
    pub updated_count: i32,
    pub skipped_count: i32,
    pub error_count: i32,
    pub errors: serde_json::Value,
    pub failure_reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitImport {
    pub id: Uuid,
    pub project_id: Uuid,
    pub field_mapping_id: Option<Uuid>,
    pub file_name: Option<String>,
    pub format: ImportFormat,
    pub status: ImportStatus,
    pub update_existing: bool,
    pub total_rows: i32,
    pub created_count: i32,
    pub updated_count: i32,
    pub skipped_count: i32,
    pub error_count: i32,
    pub errors: Vec<RowError>,
    pub failure_reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<UnitImportRow> for UnitImport {
    fn from(r: UnitImportRow) -> Self {
        Self {
            id: r.id,
            project_id: r.project_id,
            field_mapping_id: r.field_mapping_id,
            file_name: r.file_name,
            format: parse_text(&r.format),
            status: parse_text(&r.status),
            update_existing: r.update_existing,
            total_rows: r.total_rows,
            created_count: r.created_count,
            updated_count: r.updated_count,
            skipped_count: r.skipped_count,
            error_count: r.error_count,
            errors: serde_json::from_value(r.errors).unwrap_or_default(),
            failure_reason: r.failure_reason,
            created_by: r.created_by,
            created_at: r.created_at,
            completed_at: r.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_safe_values() {
        let req: ImportRequest = serde_json::from_value(serde_json::json!({
            "format": "csv",
            "data": "unit_number\nA1\n"
        }))
        .unwrap();
        assert!(!req.options.update_existing);
        assert!(req.options.skip_invalid_rows);
        assert!(!req.options.create_missing_buildings);
        assert!(!req.options.dry_run);
        assert!(req.mapping.mapping.is_none());
    }

    #[test]
    fn flattened_mapping_and_options() {
        let req: ImportRequest = serde_json::from_value(serde_json::json!({
            "format": "json",
            "data": [{ "No": "A1" }],
            "mapping": { "No": "unit_number" },
            "update_existing": true
        }))
        .unwrap();
        assert!(req.options.update_existing);
        assert_eq!(req.mapping.mapping.unwrap().len(), 1);
    }

    #[test]
    fn format_detection() {
        assert_eq!(ImportFormat::detect(Some("units.CSV"), None), Some(ImportFormat::Csv));
        assert_eq!(
            ImportFormat::detect(Some("export"), Some("application/json")),
            Some(ImportFormat::Json)
        );
        assert_eq!(ImportFormat::detect(Some("units.xlsx"), None), None);
    }
}
