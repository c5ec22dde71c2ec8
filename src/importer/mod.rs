//! Bulk unit import and reconciliation
//!
//! parse -> map columns -> validate rows -> (one transaction) resolve
//! buildings/layouts, plan create/update/skip, write -> record the run.

pub mod apply;
pub mod mapping;
pub mod parse;
pub mod plan;
pub mod validate;

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::field_mappings::{check_mapping, ColumnMapping, FieldMappingRow, UnitField};
use crate::domain::imports::{
    ImportFormat, ImportOptions, ImportPreview, ImportResponse, ImportStatus, ImportSummary,
    MappingSource, RowError,
};
use crate::error::{ApiError, ApiResult};
use apply::{ApplyError, ImportTarget};
use parse::{ParseError, ParsedTable};

/// Rows shown by the preview endpoint
const PREVIEW_SAMPLE_ROWS: usize = 10;

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        ApiError::bad_request(format!("Could not read import data: {err}"))
    }
}

/// Parse a JSON-body payload: CSV text, JSON text, or an inline JSON array
pub fn parse_body(format: ImportFormat, data: Value, max_rows: usize) -> Result<ParsedTable, ParseError> {
    match (format, data) {
        (ImportFormat::Csv, Value::String(text)) => parse::parse_csv(&text, max_rows),
        (ImportFormat::Csv, _) => Err(ParseError::Csv("CSV data must be sent as a string".into())),
        (ImportFormat::Json, Value::String(text)) => parse::parse_json_text(&text, max_rows),
        (ImportFormat::Json, value) => parse::parse_json_value(value, max_rows),
    }
}

/// Parse an uploaded file body
pub fn parse_bytes(format: ImportFormat, bytes: &[u8], max_rows: usize) -> Result<ParsedTable, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|_| match format {
        ImportFormat::Csv => ParseError::Csv("file is not UTF-8 text".into()),
        ImportFormat::Json => ParseError::Json("file is not UTF-8 text".into()),
    })?;
    match format {
        ImportFormat::Csv => parse::parse_csv(text, max_rows),
        ImportFormat::Json => parse::parse_json_text(text, max_rows),
    }
}

fn mapping_error(message: impl Into<String>) -> ApiError {
    let message = message.into();
    ApiError::validation_with(message.clone(), json!({ "mapping": [message] }))
}

/// Pick the mapping for a run: a saved mapping (of this project or shared),
/// an inline one, or a suggestion from the headers.
pub async fn resolve_mapping(
    db: &PgPool,
    project_id: Uuid,
    source: &MappingSource,
    headers: &[String],
) -> ApiResult<(ColumnMapping, Option<Uuid>)> {
    if let Some(id) = source.field_mapping_id {
        let row: FieldMappingRow = sqlx::query_as(
            r#"
            SELECT id, project_id, name, mapping, created_by, created_at, updated_at
            FROM field_mappings
            WHERE id = $1 AND (project_id IS NULL OR project_id = $2)
            "#,
        )
        .bind(id)
        .bind(project_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Field mapping not found"))?;

        let mapping: ColumnMapping = serde_json::from_value(row.mapping)
            .map_err(|e| ApiError::internal(format!("Stored field mapping {id} is corrupt: {e}")))?;
        return Ok((mapping, Some(id)));
    }

    if let Some(mapping) = &source.mapping {
        check_mapping(mapping).map_err(|e| mapping_error(e.to_string()))?;
        return Ok((mapping.clone(), None));
    }

    let suggested = mapping::suggest_mapping(headers);
    if !suggested.values().any(|f| *f == UnitField::UnitNumber) {
        return Err(mapping_error(
            "Could not detect a unit number column; send a mapping",
        ));
    }
    Ok((suggested, None))
}

/// Dry analysis for the preview endpoint. Never touches the database.
pub fn preview(format: ImportFormat, table: &ParsedTable, mapping: Option<ColumnMapping>) -> ImportPreview {
    let suggested_mapping = mapping.unwrap_or_else(|| mapping::suggest_mapping(&table.headers));
    let unmapped_columns = mapping::unmapped_columns(&table.headers, &suggested_mapping);

    let errors = match mapping::bind(&suggested_mapping, &table.headers) {
        Ok(bound) if bound.columns.iter().any(|(_, f)| *f == UnitField::UnitNumber) => {
            let rows: Vec<_> = table.rows.iter().map(|r| mapping::apply(&bound, r)).collect();
            validate::validate_rows(&rows).errors
        }
        Ok(_) => vec![RowError::row_level(0, "no column is mapped to unit_number")],
        Err(e) => vec![RowError::row_level(0, e.to_string())],
    };

    ImportPreview {
        format,
        headers: table.headers.clone(),
        total_rows: table.rows.len(),
        suggested_mapping,
        unmapped_columns,
        sample: table.sample(PREVIEW_SAMPLE_ROWS),
        errors,
    }
}

/// Everything needed to run one import
#[derive(Debug)]
pub struct ImportJob {
    pub format: ImportFormat,
    pub table: ParsedTable,
    pub mapping: ColumnMapping,
    pub field_mapping_id: Option<Uuid>,
    pub file_name: Option<String>,
    pub options: ImportOptions,
}

fn rejected(errors: Vec<RowError>) -> ApiError {
    ApiError::validation_with(
        format!("{} import rows are invalid; nothing was imported", errors.len()),
        json!({ "errors": errors }),
    )
}

async fn record_start(db: &PgPool, target: &ImportTarget, job: &ImportJob) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO unit_imports (
            id, project_id, field_mapping_id, file_name, format, status,
            update_existing, total_rows, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(target.project_id)
    .bind(job.field_mapping_id)
    .bind(&job.file_name)
    .bind(job.format.as_str())
    .bind(ImportStatus::Processing.as_str())
    .bind(job.options.update_existing)
    .bind(job.table.rows.len() as i32)
    .bind(target.user_id)
    .fetch_one(db)
    .await
}

async fn record_finish(
    db: &PgPool,
    id: Uuid,
    status: ImportStatus,
    summary: &ImportSummary,
    failure_reason: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE unit_imports SET
            status = $2,
            created_count = $3,
            updated_count = $4,
            skipped_count = $5,
            error_count = $6,
            errors = $7,
            failure_reason = $8,
            completed_at = $9
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(summary.created as i32)
    .bind(summary.updated as i32)
    .bind(summary.skipped as i32)
    .bind(summary.failed as i32)
    .bind(json!(summary.errors))
    .bind(failure_reason)
    .bind(Utc::now())
    .execute(db)
    .await?;
    Ok(())
}

/// The transactional part. Dry runs roll back at the end.
async fn execute(
    db: &PgPool,
    target: &ImportTarget,
    drafts: &[validate::UnitDraft],
    options: &ImportOptions,
    summary: &mut ImportSummary,
    statement_timeout: Duration,
) -> Result<(), ApplyError> {
    let mut tx = db.begin().await?;

    // SET does not take bind parameters
    sqlx::query(&format!(
        "SET LOCAL statement_timeout = {}",
        statement_timeout.as_millis()
    ))
    .execute(&mut *tx)
    .await?;

    apply::apply_drafts(&mut tx, target, drafts, options, summary).await?;

    if options.dry_run {
        tx.rollback().await?;
    } else {
        tx.commit().await?;
    }
    Ok(())
}

/// Run a whole import and record it (unless dry run)
pub async fn run(
    db: &PgPool,
    timeout: Duration,
    target: ImportTarget,
    job: ImportJob,
) -> ApiResult<ImportResponse> {
    let bound = mapping::bind(&job.mapping, &job.table.headers)
        .map_err(|e| mapping_error(e.to_string()))?;
    if !bound.missing.is_empty() {
        tracing::debug!(missing = ?bound.missing, "Mapped columns absent from import file");
    }

    let rows: Vec<_> = job.table.rows.iter().map(|r| mapping::apply(&bound, r)).collect();
    let validated = validate::validate_rows(&rows);

    if !job.options.skip_invalid_rows && !validated.errors.is_empty() {
        return Err(rejected(validated.errors));
    }

    let mut summary = ImportSummary {
        total_rows: rows.len(),
        failed: validated.failed_rows,
        errors: validated.errors,
        ..Default::default()
    };

    let record_id = if job.options.dry_run {
        None
    } else {
        Some(record_start(db, &target, &job).await?)
    };

    let outcome = tokio::time::timeout(
        timeout,
        execute(db, &target, &validated.drafts, &job.options, &mut summary, timeout),
    )
    .await;

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(ApplyError::Rejected(errors))) => Some((
            "Rows reference unknown buildings or layouts".to_string(),
            rejected(errors),
        )),
        Ok(Err(ApplyError::Database(e)))
            if crate::db::sqlstate(&e).as_deref() == Some("57014") =>
        {
            Some(("Import timed out".to_string(), timeout_error(timeout)))
        }
        Ok(Err(ApplyError::Database(e))) => Some((format!("Database error: {e}"), ApiError::from(e))),
        Err(_) => Some(("Import timed out".to_string(), timeout_error(timeout))),
    };

    if let Some((reason, err)) = failure {
        // Nothing was committed
        summary.created = 0;
        summary.updated = 0;
        summary.skipped = 0;
        summary.buildings_created = 0;
        if let Some(id) = record_id {
            if let Err(e) = record_finish(db, id, ImportStatus::Failed, &summary, Some(&reason)).await {
                tracing::error!(import_id = %id, error = ?e, "Failed to record import failure");
            }
        }
        tracing::warn!(
            project_id = %target.project_id,
            user_id = %target.user_id,
            reason = %reason,
            "Unit import failed"
        );
        return Err(err);
    }

    if let Some(id) = record_id {
        record_finish(db, id, ImportStatus::Completed, &summary, None).await?;
    }

    tracing::info!(
        project_id = %target.project_id,
        user_id = %target.user_id,
        import_id = ?record_id,
        dry_run = job.options.dry_run,
        total = summary.total_rows,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        failed = summary.failed,
        "Unit import finished"
    );

    Ok(ImportResponse {
        import_id: record_id,
        dry_run: job.options.dry_run,
        mapping: job.mapping,
        summary,
    })
}

fn timeout_error(timeout: Duration) -> ApiError {
    ApiError::Timeout(format!(
        "Import did not finish within {} seconds and was rolled back",
        timeout.as_secs()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_parsing_by_format() {
        let csv = parse_body(ImportFormat::Csv, json!("unit\nA1\n"), 10).unwrap();
        assert_eq!(csv.rows.len(), 1);

        let inline = parse_body(ImportFormat::Json, json!([{ "unit": "A1" }]), 10).unwrap();
        assert_eq!(inline.rows[0]["unit"], "A1");

        let text = parse_body(ImportFormat::Json, json!(r#"[{"unit":"B2"}]"#), 10).unwrap();
        assert_eq!(text.rows[0]["unit"], "B2");

        assert!(parse_body(ImportFormat::Csv, json!([1]), 10).is_err());
    }

    #[test]
    fn uploads_must_be_utf8() {
        assert!(parse_bytes(ImportFormat::Csv, &[0xff, 0xfe, 0x00], 10).is_err());
        assert!(parse_bytes(ImportFormat::Csv, b"unit\nA\n", 10).is_ok());
    }

    #[test]
    fn preview_suggests_and_validates() {
        let table = parse::parse_csv("Unit,Price,Comment\nA1,100000,\nA1,abc,x\n", 10).unwrap();
        let preview = preview(ImportFormat::Csv, &table, None);

        assert_eq!(preview.total_rows, 2);
        assert_eq!(preview.suggested_mapping["Unit"], UnitField::UnitNumber);
        assert_eq!(preview.unmapped_columns, vec!["Comment".to_string()]);
        assert_eq!(preview.sample.len(), 2);
        // row 2: bad price; the duplicate check only applies to valid rows
        assert_eq!(preview.errors.len(), 1);
        assert_eq!(preview.errors[0].row, 2);
        assert_eq!(preview.errors[0].field.as_deref(), Some("price"));
    }

    #[test]
    fn preview_without_unit_number_column() {
        let table = parse::parse_csv("Price\n1\n", 10).unwrap();
        let preview = preview(ImportFormat::Csv, &table, None);
        assert_eq!(preview.errors.len(), 1);
        assert_eq!(preview.errors[0].row, 0);
    }
}
