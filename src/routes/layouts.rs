//! Unit layout routes (admin)
//!
//! Layouts are per-project floor-plan templates. Applying a layout links
//! units to it and copies its room counts and area.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, ValidatedJson};
use crate::app::AppState;
use crate::auth::{ChildTable, RequireAdmin};
use crate::domain::i18n::{checked_locale, group_by_parent};
use crate::domain::layouts::{
    check_area, ApplyLayoutRequest, ApplyLayoutResponse, CreateLayoutRequest, LayoutAdminResponse,
    LayoutTranslation, LayoutTranslationInput, UnitLayout, UpdateLayoutRequest,
};
use crate::error::ApiError;

const COLUMNS: &str =
    "id, project_id, name, bedrooms, bathrooms, area, floor_plan_url, created_at, updated_at";

async fn load_translations(
    db: &sqlx::PgPool,
    ids: &[Uuid],
) -> Result<Vec<LayoutTranslation>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT layout_id, locale, name, description
        FROM unit_layout_translations
        WHERE layout_id = ANY($1)
        ORDER BY locale
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
}

async fn load_admin(db: &sqlx::PgPool, id: Uuid) -> Result<LayoutAdminResponse, ApiError> {
    let layout: UnitLayout =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM unit_layouts WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| ApiError::not_found("Layout not found"))?;

    Ok(LayoutAdminResponse {
        translations: load_translations(db, &[id]).await?,
        layout,
    })
}

fn area_error(message: &str) -> ApiError {
    ApiError::validation_with(message.to_string(), json!({ "area": [message] }))
}

fn name_conflict(err: sqlx::Error, name: &str) -> ApiError {
    match crate::db::sqlstate(&err).as_deref() {
        Some("23505") => {
            ApiError::conflict(format!("A layout named '{name}' already exists in this project"))
        }
        _ => err.into(),
    }
}

/// POST /admin/projects/:id/layouts
pub async fn create_layout(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateLayoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;
    check_area(req.area).map_err(area_error)?;

    let name = req.name.trim();
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO unit_layouts (id, project_id, name, bedrooms, bathrooms, area, floor_plan_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(project_id)
    .bind(name)
    .bind(req.bedrooms)
    .bind(req.bathrooms)
    .bind(req.area)
    .bind(&req.floor_plan_url)
    .fetch_one(&state.db)
    .await
    .map_err(|e| name_conflict(e, name))?;

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %project_id,
        layout_id = %id,
        "Layout created"
    );

    Ok(Created(load_admin(&state.db, id).await?))
}

/// GET /admin/projects/:id/layouts
pub async fn list_layouts(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let layouts: Vec<UnitLayout> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM unit_layouts WHERE project_id = $1 ORDER BY name"
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await?;

    let ids: Vec<Uuid> = layouts.iter().map(|l| l.id).collect();
    let mut translations = group_by_parent(load_translations(&state.db, &ids).await?, |t| t.layout_id);

    let data: Vec<LayoutAdminResponse> = layouts
        .into_iter()
        .map(|layout| LayoutAdminResponse {
            translations: translations.remove(&layout.id).unwrap_or_default(),
            layout,
        })
        .collect();

    Ok(DataResponse::new(data))
}

/// GET /admin/layouts/:id
pub async fn get_layout(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::UnitLayouts, id).await?;
    Ok(DataResponse::new(load_admin(&state.db, id).await?))
}

/// PUT /admin/layouts/:id
///
/// Units already using the layout keep their own values; use apply to copy
/// the new ones.
pub async fn update_layout(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateLayoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::UnitLayouts, id).await?;
    check_area(req.area).map_err(area_error)?;

    let name = req.name.as_deref().map(str::trim);
    sqlx::query(
        r#"
        UPDATE unit_layouts SET
            name = COALESCE($2, name),
            bedrooms = COALESCE($3, bedrooms),
            bathrooms = COALESCE($4, bathrooms),
            area = COALESCE($5, area),
            floor_plan_url = COALESCE($6, floor_plan_url),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(req.bedrooms)
    .bind(req.bathrooms)
    .bind(req.area)
    .bind(&req.floor_plan_url)
    .execute(&state.db)
    .await
    .map_err(|e| name_conflict(e, name.unwrap_or_default()))?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), layout_id = %id, "Layout updated");

    Ok(DataResponse::new(load_admin(&state.db, id).await?))
}

/// DELETE /admin/layouts/:id
pub async fn delete_layout(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::UnitLayouts, id).await?;

    sqlx::query("DELETE FROM unit_layouts WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), layout_id = %id, "Layout deleted");

    Ok(NoContent)
}

/// PUT /admin/layouts/:id/translations/:locale
pub async fn upsert_translation(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path((id, locale)): Path<(Uuid, String)>,
    ValidatedJson(req): ValidatedJson<LayoutTranslationInput>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::UnitLayouts, id).await?;
    let locale = checked_locale(&locale, &state.settings.supported_locales)?;

    let translation: LayoutTranslation = sqlx::query_as(
        r#"
        INSERT INTO unit_layout_translations (layout_id, locale, name, description)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (layout_id, locale)
        DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description
        RETURNING layout_id, locale, name, description
        "#,
    )
    .bind(id)
    .bind(&locale)
    .bind(&req.name)
    .bind(&req.description)
    .fetch_one(&state.db)
    .await?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), layout_id = %id, locale = %locale, "Layout translation saved");

    Ok(DataResponse::new(translation))
}

/// DELETE /admin/layouts/:id/translations/:locale
///
/// Layouts fall back to their internal name, so every translation may go.
pub async fn delete_translation(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path((id, locale)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::UnitLayouts, id).await?;

    let result = sqlx::query("DELETE FROM unit_layout_translations WHERE layout_id = $1 AND locale = $2")
        .bind(id)
        .bind(&locale)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found(format!("No '{locale}' translation for this layout")));
    }

    state.cache.invalidate_public().await;
    Ok(NoContent)
}

/// POST /admin/layouts/:id/apply
pub async fn apply_layout(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ApplyLayoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project_id = admin.authorize_child(&state.db, ChildTable::UnitLayouts, id).await?;

    let mut unit_ids = req.unit_ids.clone();
    unit_ids.sort();
    unit_ids.dedup();

    let mut tx = state.db.begin().await?;

    let foreign: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT requested.id
        FROM UNNEST($1::uuid[]) AS requested(id)
        LEFT JOIN units u ON u.id = requested.id AND u.project_id = $2
        WHERE u.id IS NULL
        "#,
    )
    .bind(&unit_ids)
    .bind(project_id)
    .fetch_all(&mut *tx)
    .await?;
    if !foreign.is_empty() {
        return Err(ApiError::validation_with(
            format!("{} units do not belong to this layout's project", foreign.len()),
            json!({ "unit_ids": foreign }),
        ));
    }

    let result = if req.link_only {
        sqlx::query("UPDATE units SET layout_id = $1, updated_at = NOW() WHERE id = ANY($2)")
            .bind(id)
            .bind(&unit_ids)
            .execute(&mut *tx)
            .await?
    } else {
        sqlx::query(
            r#"
            UPDATE units u SET
                layout_id = l.id,
                bedrooms = COALESCE(l.bedrooms, u.bedrooms),
                bathrooms = COALESCE(l.bathrooms, u.bathrooms),
                area = COALESCE(l.area, u.area),
                updated_at = NOW()
            FROM unit_layouts l
            WHERE l.id = $1 AND u.id = ANY($2)
            "#,
        )
        .bind(id)
        .bind(&unit_ids)
        .execute(&mut *tx)
        .await?
    };

    tx.commit().await?;

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        layout_id = %id,
        units = result.rows_affected(),
        link_only = req.link_only,
        "Layout applied"
    );

    Ok(DataResponse::new(ApplyLayoutResponse {
        layout_id: id,
        updated_units: result.rows_affected(),
    }))
}
