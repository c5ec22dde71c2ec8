//! Unit routes (admin)

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams, ValidatedJson};
use crate::app::AppState;
use crate::auth::{ChildTable, RequireAdmin};
use crate::domain::pricing::{PriceChangeSource, PriceHistoryEntry};
use crate::domain::units::{
    check_amounts, CreateUnitRequest, Unit, UnitQuery, UnitRow, UnitStatusUpdate,
    UpdateUnitRequest,
};
use crate::error::ApiError;

const COLUMNS: &str = "id, project_id, building_id, layout_id, unit_number, floor, bedrooms, \
    bathrooms, area, price, currency, status, view, orientation, created_at, updated_at";

fn amount_error(message: String) -> ApiError {
    ApiError::validation_with(message.clone(), json!({ "amount": [message] }))
}

fn number_conflict(err: sqlx::Error, unit_number: &str) -> ApiError {
    match crate::db::sqlstate(&err).as_deref() {
        Some("23505") => {
            ApiError::conflict(format!("Unit '{unit_number}' already exists in this project"))
        }
        _ => err.into(),
    }
}

/// Building and layout references must stay inside the unit's project
pub(crate) async fn check_references(
    conn: &mut PgConnection,
    project_id: Uuid,
    building_id: Option<Uuid>,
    layout_id: Option<Uuid>,
) -> Result<(), ApiError> {
    if let Some(building_id) = building_id {
        let found: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM buildings WHERE id = $1 AND project_id = $2")
                .bind(building_id)
                .bind(project_id)
                .fetch_optional(&mut *conn)
                .await?;
        if found.is_none() {
            return Err(ApiError::bad_request("Building does not belong to this project"));
        }
    }
    if let Some(layout_id) = layout_id {
        let found: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM unit_layouts WHERE id = $1 AND project_id = $2")
                .bind(layout_id)
                .bind(project_id)
                .fetch_optional(&mut *conn)
                .await?;
        if found.is_none() {
            return Err(ApiError::bad_request("Layout does not belong to this project"));
        }
    }
    Ok(())
}

/// Append a row to `unit_price_history`
pub(crate) async fn record_price_change(
    conn: &mut PgConnection,
    unit_id: Uuid,
    old_price: Option<Decimal>,
    new_price: Option<Decimal>,
    source: PriceChangeSource,
    changed_by: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO unit_price_history (id, unit_id, old_price, new_price, source, changed_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(unit_id)
    .bind(old_price)
    .bind(new_price)
    .bind(source.as_str())
    .bind(changed_by)
    .execute(conn)
    .await?;
    Ok(())
}

/// POST /admin/projects/:id/units
pub async fn create_unit(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateUnitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;
    check_amounts(req.area, req.price).map_err(amount_error)?;

    let unit_number = req.unit_number.trim();
    let mut tx = state.db.begin().await?;
    check_references(&mut tx, project_id, req.building_id, req.layout_id).await?;

    let row: UnitRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO units (
            id, project_id, building_id, layout_id, unit_number, floor, bedrooms,
            bathrooms, area, price, currency, status, view, orientation
        )
        SELECT $1, p.id, $3, $4, $5, $6, $7, $8, $9, $10, COALESCE($11, p.currency), $12, $13, $14
        FROM projects p
        WHERE p.id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(project_id)
    .bind(req.building_id)
    .bind(req.layout_id)
    .bind(unit_number)
    .bind(req.floor)
    .bind(req.bedrooms)
    .bind(req.bathrooms)
    .bind(req.area)
    .bind(req.price)
    .bind(&req.currency)
    .bind(req.status.as_str())
    .bind(&req.view)
    .bind(&req.orientation)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| number_conflict(e, unit_number))?;

    if row.price.is_some() {
        record_price_change(&mut tx, row.id, None, row.price, PriceChangeSource::Manual, admin.user_id())
            .await?;
    }

    tx.commit().await?;

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %project_id,
        unit_id = %row.id,
        unit_number = %row.unit_number,
        "Unit created"
    );

    Ok(Created(Unit::from(row)))
}

/// GET /admin/projects/:id/units
pub async fn list_units(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    Query(filter): Query<UnitQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let status = filter.status.map(|s| s.as_str());
    let where_clause = r#"
        WHERE project_id = $1
          AND ($2::uuid IS NULL OR building_id = $2)
          AND ($3::uuid IS NULL OR layout_id = $3)
          AND ($4::text IS NULL OR status = $4)
          AND ($5::int IS NULL OR floor >= $5)
          AND ($6::int IS NULL OR floor <= $6)
          AND ($7::int IS NULL OR bedrooms = $7)
          AND ($8::numeric IS NULL OR price >= $8)
          AND ($9::numeric IS NULL OR price <= $9)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM units {where_clause}"))
        .bind(project_id)
        .bind(filter.building_id)
        .bind(filter.layout_id)
        .bind(status)
        .bind(filter.min_floor)
        .bind(filter.max_floor)
        .bind(filter.bedrooms)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .fetch_one(&state.db)
        .await?;

    let rows: Vec<UnitRow> = sqlx::query_as(&format!(
        r#"
        SELECT {COLUMNS} FROM units
        {where_clause}
        ORDER BY floor NULLS LAST, lower(unit_number)
        LIMIT $10 OFFSET $11
        "#
    ))
    .bind(project_id)
    .bind(filter.building_id)
    .bind(filter.layout_id)
    .bind(status)
    .bind(filter.min_floor)
    .bind(filter.max_floor)
    .bind(filter.bedrooms)
    .bind(filter.min_price)
    .bind(filter.max_price)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data: Vec<Unit> = rows.into_iter().map(Unit::from).collect();
    Ok(Paginated::new(data, &pagination, total))
}

async fn fetch_unit(db: &sqlx::PgPool, id: Uuid) -> Result<UnitRow, ApiError> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM units WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Unit not found"))
}

/// GET /admin/units/:id
pub async fn get_unit(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::Units, id).await?;
    Ok(DataResponse::new(Unit::from(fetch_unit(&state.db, id).await?)))
}

/// PUT /admin/units/:id
pub async fn update_unit(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateUnitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project_id = admin.authorize_child(&state.db, ChildTable::Units, id).await?;
    check_amounts(req.area, req.price).map_err(amount_error)?;

    let unit_number = req.unit_number.as_deref().map(str::trim);
    let mut tx = state.db.begin().await?;
    check_references(&mut tx, project_id, req.building_id, req.layout_id).await?;

    let old_price: Option<Decimal> =
        sqlx::query_scalar("SELECT price FROM units WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

    let row: UnitRow = sqlx::query_as(&format!(
        r#"
        UPDATE units SET
            unit_number = COALESCE($2, unit_number),
            building_id = COALESCE($3, building_id),
            layout_id = COALESCE($4, layout_id),
            floor = COALESCE($5, floor),
            bedrooms = COALESCE($6, bedrooms),
            bathrooms = COALESCE($7, bathrooms),
            area = COALESCE($8, area),
            price = COALESCE($9, price),
            currency = COALESCE($10, currency),
            status = COALESCE($11, status),
            view = COALESCE($12, view),
            orientation = COALESCE($13, orientation),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(unit_number)
    .bind(req.building_id)
    .bind(req.layout_id)
    .bind(req.floor)
    .bind(req.bedrooms)
    .bind(req.bathrooms)
    .bind(req.area)
    .bind(req.price)
    .bind(&req.currency)
    .bind(req.status.map(|s| s.as_str()))
    .bind(&req.view)
    .bind(&req.orientation)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| number_conflict(e, unit_number.unwrap_or_default()))?;

    if row.price != old_price {
        record_price_change(&mut tx, id, old_price, row.price, PriceChangeSource::Manual, admin.user_id())
            .await?;
    }

    tx.commit().await?;

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        unit_id = %id,
        price_changed = row.price != old_price,
        "Unit updated"
    );

    Ok(DataResponse::new(Unit::from(row)))
}

/// PATCH /admin/units/:id/status
pub async fn set_status(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    axum::Json(req): axum::Json<UnitStatusUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::Units, id).await?;

    let row: UnitRow = sqlx::query_as(&format!(
        "UPDATE units SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(req.status.as_str())
    .fetch_one(&state.db)
    .await?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), unit_id = %id, status = %req.status, "Unit status changed");

    Ok(DataResponse::new(Unit::from(row)))
}

/// DELETE /admin/units/:id
pub async fn delete_unit(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::Units, id).await?;

    sqlx::query("DELETE FROM units WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), unit_id = %id, "Unit deleted");

    Ok(NoContent)
}

/// GET /admin/units/:id/price-history
pub async fn price_history(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::Units, id).await?;

    let entries: Vec<PriceHistoryEntry> = sqlx::query_as(
        r#"
        SELECT id, unit_id, old_price, new_price, source, changed_by, changed_at
        FROM unit_price_history
        WHERE unit_id = $1
        ORDER BY changed_at DESC
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(entries))
}
