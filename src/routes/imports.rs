//! Bulk unit import routes (admin)

use axum::{
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::{DataResponse, Paginated, PaginationParams, ValidatedJson};
use crate::app::AppState;
use crate::auth::{ChildTable, RequireAdmin};
use crate::domain::field_mappings::ColumnMapping;
use crate::domain::imports::{
    ImportFormat, ImportOptions, ImportRequest, MappingSource, UnitImport, UnitImportRow,
};
use crate::error::ApiError;
use crate::importer::{self, apply::ImportTarget, parse::ParsedTable, ImportJob};

const COLUMNS: &str = "id, project_id, field_mapping_id, file_name, format, status, \
    update_existing, total_rows, created_count, updated_count, skipped_count, error_count, \
    errors, failure_reason, created_by, created_at, completed_at";

async fn import_target(
    state: &AppState,
    admin: &RequireAdmin,
    project_id: Uuid,
) -> Result<ImportTarget, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let currency: String = sqlx::query_scalar("SELECT currency FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_one(&state.db)
        .await?;

    Ok(ImportTarget {
        project_id,
        currency,
        user_id: admin.user_id(),
    })
}

/// Resolve the mapping and run the pipeline
async fn run_import(
    state: &AppState,
    target: ImportTarget,
    format: ImportFormat,
    table: ParsedTable,
    file_name: Option<String>,
    source: &MappingSource,
    options: ImportOptions,
) -> Result<impl IntoResponse, ApiError> {
    let (mapping, field_mapping_id) =
        importer::resolve_mapping(&state.db, target.project_id, source, &table.headers).await?;

    let timeout = Duration::from_secs(state.settings.import_transaction_timeout_seconds);
    let response = importer::run(
        &state.db,
        timeout,
        target,
        ImportJob {
            format,
            table,
            mapping,
            field_mapping_id,
            file_name,
            options,
        },
    )
    .await?;

    if !options.dry_run {
        state.cache.invalidate_public().await;
    }

    Ok(DataResponse::new(response))
}

/// POST /admin/projects/:id/imports
pub async fn import_units(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = import_target(&state, &admin, project_id).await?;
    let table = importer::parse_body(req.format, req.data, state.settings.import_max_rows)?;

    run_import(&state, target, req.format, table, req.file_name, &req.mapping, req.options).await
}

/// Fields of the multipart upload form
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(Option<String>, Option<String>, Vec<u8>)>,
    format: Option<ImportFormat>,
    mapping: MappingSource,
    options: ImportOptions,
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::bad_request(format!("Invalid multipart body: {err}"))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ApiError::bad_request(format!("Field '{name}' must be true or false"))),
    }
}

async fn read_upload_form(multipart: &mut Multipart, max_bytes: usize) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if bytes.len() > max_bytes {
                return Err(ApiError::bad_request(format!(
                    "File exceeds the {max_bytes} byte upload limit"
                )));
            }
            form.file = Some((file_name, content_type, bytes.to_vec()));
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "format" => {
                form.format = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|e: String| ApiError::bad_request(e))?,
                )
            }
            "field_mapping_id" if !value.trim().is_empty() => {
                form.mapping.field_mapping_id = Some(value.trim().parse().map_err(|_| {
                    ApiError::bad_request("Field 'field_mapping_id' is not a valid id")
                })?)
            }
            "mapping" if !value.trim().is_empty() => {
                let mapping: ColumnMapping = serde_json::from_str(&value).map_err(|e| {
                    ApiError::bad_request(format!("Field 'mapping' is not a valid mapping: {e}"))
                })?;
                form.mapping.mapping = Some(mapping);
            }
            "update_existing" => form.options.update_existing = parse_flag(&name, &value)?,
            "skip_invalid_rows" => form.options.skip_invalid_rows = parse_flag(&name, &value)?,
            "create_missing_buildings" => {
                form.options.create_missing_buildings = parse_flag(&name, &value)?
            }
            "dry_run" => form.options.dry_run = parse_flag(&name, &value)?,
            _ => tracing::debug!(field = %name, "Ignoring unknown multipart field"),
        }
    }

    Ok(form)
}

/// POST /admin/projects/:id/imports/upload
///
/// Multipart form with a `file` plus the same mapping and option fields as
/// the JSON endpoint. The format comes from `format` or the file name.
pub async fn upload_import(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let target = import_target(&state, &admin, project_id).await?;
    let form = read_upload_form(&mut multipart, state.settings.upload_max_bytes).await?;

    let (file_name, content_type, bytes) = form
        .file
        .ok_or_else(|| ApiError::bad_request("Multipart field 'file' is required"))?;
    let format = form
        .format
        .or_else(|| ImportFormat::detect(file_name.as_deref(), content_type.as_deref()))
        .ok_or_else(|| ApiError::bad_request("Could not detect the file format; send 'format'"))?;

    let table = importer::parse_bytes(format, &bytes, state.settings.import_max_rows)?;

    run_import(&state, target, format, table, file_name, &form.mapping, form.options).await
}

/// POST /admin/projects/:id/imports/preview
///
/// Same body as an import. Nothing is written.
pub async fn preview_import(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;
    let table = importer::parse_body(req.format, req.data, state.settings.import_max_rows)?;

    // Auto-detection problems are reported in the preview itself
    let mapping = if req.mapping.field_mapping_id.is_some() || req.mapping.mapping.is_some() {
        let (mapping, _) =
            importer::resolve_mapping(&state.db, project_id, &req.mapping, &table.headers).await?;
        Some(mapping)
    } else {
        None
    };

    Ok(DataResponse::new(importer::preview(req.format, &table, mapping)))
}

/// GET /admin/projects/:id/imports
pub async fn list_imports(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM unit_imports WHERE project_id = $1")
        .bind(project_id)
        .fetch_one(&state.db)
        .await?;

    let rows: Vec<UnitImportRow> = sqlx::query_as(&format!(
        r#"
        SELECT {COLUMNS} FROM unit_imports
        WHERE project_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(project_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data: Vec<UnitImport> = rows.into_iter().map(UnitImport::from).collect();
    Ok(Paginated::new(data, &pagination, total))
}

/// GET /admin/imports/:id
pub async fn get_import(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::UnitImports, id).await?;

    let row: UnitImportRow =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM unit_imports WHERE id = $1"))
            .bind(id)
            .fetch_one(&state.db)
            .await?;

    Ok(DataResponse::new(UnitImport::from(row)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_form_spellings() {
        assert!(parse_flag("dry_run", "on").unwrap());
        assert!(parse_flag("dry_run", " TRUE ").unwrap());
        assert!(!parse_flag("dry_run", "").unwrap());
        assert!(!parse_flag("dry_run", "0").unwrap());
        assert!(parse_flag("dry_run", "maybe").is_err());
    }
}
