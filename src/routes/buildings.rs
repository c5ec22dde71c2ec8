//! Building routes (admin)

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, ValidatedJson};
use crate::app::AppState;
use crate::auth::{ChildTable, RequireAdmin};
use crate::domain::buildings::{
    Building, BuildingWithCounts, CreateBuildingRequest, UpdateBuildingRequest,
};
use crate::error::ApiError;

const COLUMNS: &str = "id, project_id, name, floors, completion_date, created_at, updated_at";

fn name_conflict(err: sqlx::Error, name: &str) -> ApiError {
    match crate::db::sqlstate(&err).as_deref() {
        Some("23505") => {
            ApiError::conflict(format!("A building named '{name}' already exists in this project"))
        }
        _ => err.into(),
    }
}

/// POST /admin/projects/:id/buildings
pub async fn create_building(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateBuildingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let name = req.name.trim();
    let building: Building = sqlx::query_as(&format!(
        r#"
        INSERT INTO buildings (id, project_id, name, floors, completion_date)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(project_id)
    .bind(name)
    .bind(req.floors)
    .bind(req.completion_date)
    .fetch_one(&state.db)
    .await
    .map_err(|e| name_conflict(e, name))?;

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %project_id,
        building_id = %building.id,
        "Building created"
    );

    Ok(Created(building))
}

/// GET /admin/projects/:id/buildings
pub async fn list_buildings(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let buildings: Vec<BuildingWithCounts> = sqlx::query_as(
        r#"
        SELECT b.id, b.project_id, b.name, b.floors, b.completion_date, b.created_at, b.updated_at,
               COUNT(u.id) AS unit_count,
               COUNT(u.id) FILTER (WHERE u.status = 'available') AS available_units
        FROM buildings b
        LEFT JOIN units u ON u.building_id = b.id
        WHERE b.project_id = $1
        GROUP BY b.id
        ORDER BY b.name
        "#,
    )
    .bind(project_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(buildings))
}

/// GET /admin/buildings/:id
pub async fn get_building(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::Buildings, id).await?;

    let building: BuildingWithCounts = sqlx::query_as(
        r#"
        SELECT b.id, b.project_id, b.name, b.floors, b.completion_date, b.created_at, b.updated_at,
               COUNT(u.id) AS unit_count,
               COUNT(u.id) FILTER (WHERE u.status = 'available') AS available_units
        FROM buildings b
        LEFT JOIN units u ON u.building_id = b.id
        WHERE b.id = $1
        GROUP BY b.id
        "#,
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(DataResponse::new(building))
}

/// PUT /admin/buildings/:id
pub async fn update_building(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateBuildingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::Buildings, id).await?;

    let name = req.name.as_deref().map(str::trim);
    let building: Building = sqlx::query_as(&format!(
        r#"
        UPDATE buildings SET
            name = COALESCE($2, name),
            floors = COALESCE($3, floors),
            completion_date = COALESCE($4, completion_date),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(name)
    .bind(req.floors)
    .bind(req.completion_date)
    .fetch_one(&state.db)
    .await
    .map_err(|e| name_conflict(e, name.unwrap_or_default()))?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), building_id = %id, "Building updated");

    Ok(DataResponse::new(building))
}

/// DELETE /admin/buildings/:id
///
/// Units in the building are kept and lose their building reference.
pub async fn delete_building(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let project_id = admin.authorize_child(&state.db, ChildTable::Buildings, id).await?;

    sqlx::query("DELETE FROM buildings WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %project_id,
        building_id = %id,
        "Building deleted"
    );

    Ok(NoContent)
}
