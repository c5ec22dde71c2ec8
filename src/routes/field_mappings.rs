//! Saved import column mappings (admin)
//!
//! A mapping belongs to one project or, with no project, is shared by all.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAdmin;
use crate::domain::field_mappings::{
    CreateFieldMappingRequest, FieldMapping, FieldMappingQuery, FieldMappingRow,
    UpdateFieldMappingRequest,
};
use crate::error::ApiError;

const COLUMNS: &str = "id, project_id, name, mapping, created_by, created_at, updated_at";

fn decode(row: FieldMappingRow) -> Result<FieldMapping, ApiError> {
    let id = row.id;
    FieldMapping::try_from(row)
        .map_err(|e| ApiError::internal(format!("Stored field mapping {id} is corrupt: {e}")))
}

/// Shared mappings are admin-only; project mappings follow project access
async fn authorize(
    admin: &RequireAdmin,
    db: &sqlx::PgPool,
    project_id: Option<Uuid>,
) -> Result<(), ApiError> {
    match project_id {
        Some(project_id) => admin.authorize_project(db, project_id).await,
        None => admin.ensure_admin(),
    }
}

async fn fetch(db: &sqlx::PgPool, id: Uuid) -> Result<FieldMappingRow, ApiError> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM field_mappings WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Field mapping not found"))
}

/// POST /admin/field-mappings
pub async fn create_field_mapping(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    ValidatedJson(req): ValidatedJson<CreateFieldMappingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&admin, &state.db, req.project_id).await?;

    let row: FieldMappingRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO field_mappings (id, project_id, name, mapping, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(req.project_id)
    .bind(req.name.trim())
    .bind(json!(req.mapping))
    .bind(admin.user_id())
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        user_id = %admin.user_id(),
        field_mapping_id = %row.id,
        project_id = ?row.project_id,
        columns = req.mapping.len(),
        "Field mapping created"
    );

    Ok(Created(decode(row)?))
}

/// GET /admin/field-mappings
///
/// With `project_id`, returns that project's mappings plus the shared ones.
pub async fn list_field_mappings(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Query(filter): Query<FieldMappingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(project_id) = filter.project_id {
        admin.authorize_project(&state.db, project_id).await?;
    }

    let rows: Vec<FieldMappingRow> = sqlx::query_as(&format!(
        r#"
        SELECT {COLUMNS} FROM field_mappings
        WHERE project_id IS NULL
           OR ($1::uuid IS NOT NULL AND project_id = $1)
           OR ($1::uuid IS NULL AND $2::uuid IS NULL)
           OR ($1::uuid IS NULL AND project_id IN (SELECT id FROM projects WHERE developer_id = $2))
        ORDER BY project_id NULLS FIRST, name
        "#
    ))
    .bind(filter.project_id)
    .bind(admin.developer_scope())
    .fetch_all(&state.db)
    .await?;

    let data = rows.into_iter().map(decode).collect::<Result<Vec<_>, _>>()?;
    Ok(DataResponse::new(data))
}

/// GET /admin/field-mappings/:id
pub async fn get_field_mapping(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = fetch(&state.db, id).await?;
    if let Some(project_id) = row.project_id {
        admin.authorize_project(&state.db, project_id).await?;
    }
    Ok(DataResponse::new(decode(row)?))
}

/// PUT /admin/field-mappings/:id
pub async fn update_field_mapping(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateFieldMappingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = fetch(&state.db, id).await?;
    authorize(&admin, &state.db, existing.project_id).await?;

    let row: FieldMappingRow = sqlx::query_as(&format!(
        r#"
        UPDATE field_mappings SET
            name = COALESCE($2, name),
            mapping = COALESCE($3, mapping),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.mapping.as_ref().map(|m| json!(m)))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(user_id = %admin.user_id(), field_mapping_id = %id, "Field mapping updated");

    Ok(DataResponse::new(decode(row)?))
}

/// DELETE /admin/field-mappings/:id
///
/// Past imports keep their history with the mapping reference cleared.
pub async fn delete_field_mapping(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = fetch(&state.db, id).await?;
    authorize(&admin, &state.db, existing.project_id).await?;

    sqlx::query("DELETE FROM field_mappings WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %admin.user_id(), field_mapping_id = %id, "Field mapping deleted");

    Ok(NoContent)
}
