//! Location routes (admin only)

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAdmin;
use crate::domain::locations::{
    CreateLocationRequest, Location, LocationQuery, UpdateLocationRequest,
};
use crate::error::ApiError;

const COLUMNS: &str =
    "id, country, city, district, address, latitude, longitude, created_at, updated_at";

/// POST /admin/locations
///
/// Missing coordinates are looked up with the geocoder when one is configured.
/// A failed lookup never blocks the create.
pub async fn create_location(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    ValidatedJson(req): ValidatedJson<CreateLocationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (mut latitude, mut longitude) = (req.latitude, req.longitude);

    if (latitude.is_none() || longitude.is_none()) && !req.skip_geocoding {
        if let Some(geocoder) = &state.geocoder {
            let query = Location::geocode_query(
                &req.country,
                &req.city,
                req.district.as_deref(),
                req.address.as_deref(),
            );
            match geocoder.geocode(&query).await {
                Ok(Some(found)) => {
                    latitude = Some(found.latitude);
                    longitude = Some(found.longitude);
                }
                Ok(None) => tracing::info!(query = %query, "Geocoder found no match"),
                Err(e) => tracing::warn!(error = %e, query = %query, "Geocoding failed"),
            }
        }
    }

    let location: Location = sqlx::query_as(&format!(
        r#"
        INSERT INTO locations (id, country, city, district, address, latitude, longitude)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(req.country.trim())
    .bind(req.city.trim())
    .bind(&req.district)
    .bind(&req.address)
    .bind(latitude)
    .bind(longitude)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        user_id = %admin.user_id(),
        location_id = %location.id,
        geocoded = location.latitude.is_some() && req.latitude.is_none(),
        "Location created"
    );

    Ok(Created(location))
}

/// GET /admin/locations
pub async fn list_locations(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(filter): Query<LocationQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let where_clause = r#"
        WHERE ($1::text IS NULL OR lower(country) = lower($1))
          AND ($2::text IS NULL OR lower(city) = lower($2))
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM locations {where_clause}"))
        .bind(&filter.country)
        .bind(&filter.city)
        .fetch_one(&state.db)
        .await?;

    let locations: Vec<Location> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM locations {where_clause} ORDER BY country, city LIMIT $3 OFFSET $4"
    ))
    .bind(&filter.country)
    .bind(&filter.city)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(locations, &pagination, total))
}

/// GET /admin/locations/:id
pub async fn get_location(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let location: Location = sqlx::query_as(&format!("SELECT {COLUMNS} FROM locations WHERE id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Location not found"))?;

    Ok(DataResponse::new(location))
}

/// PUT /admin/locations/:id
pub async fn update_location(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateLocationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let location: Location = sqlx::query_as(&format!(
        r#"
        UPDATE locations SET
            country = COALESCE($2, country),
            city = COALESCE($3, city),
            district = COALESCE($4, district),
            address = COALESCE($5, address),
            latitude = COALESCE($6, latitude),
            longitude = COALESCE($7, longitude),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&req.country)
    .bind(&req.city)
    .bind(&req.district)
    .bind(&req.address)
    .bind(req.latitude)
    .bind(req.longitude)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Location not found"))?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), location_id = %id, "Location updated");

    Ok(DataResponse::new(location))
}

/// DELETE /admin/locations/:id
///
/// Projects keep existing with no location.
pub async fn delete_location(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_admin()?;

    let result = sqlx::query("DELETE FROM locations WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Location not found"));
    }

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), location_id = %id, "Location deleted");

    Ok(NoContent)
}
