//! Amenity routes
//!
//! The catalog is shared across projects and managed by admins; projects
//! pick from it.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAdmin;
use crate::domain::amenities::{
    Amenity, AmenityAdminResponse, AmenityPublicResponse, AmenityTranslation,
    AmenityTranslationInput, CreateAmenityRequest, SetProjectAmenitiesRequest,
    UpdateAmenityRequest,
};
use crate::domain::i18n::{checked_locale, group_by_parent, Locale};
use crate::error::ApiError;

pub(crate) async fn load_translations(
    db: &sqlx::PgPool,
    ids: &[Uuid],
) -> Result<Vec<AmenityTranslation>, sqlx::Error> {
    sqlx::query_as(
        "SELECT amenity_id, locale, name FROM amenity_translations WHERE amenity_id = ANY($1) ORDER BY locale",
    )
    .bind(ids)
    .fetch_all(db)
    .await
}

async fn load_admin(db: &sqlx::PgPool, id: Uuid) -> Result<AmenityAdminResponse, ApiError> {
    let amenity: Amenity =
        sqlx::query_as("SELECT id, slug, icon, created_at FROM amenities WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| ApiError::not_found("Amenity not found"))?;

    Ok(AmenityAdminResponse {
        translations: load_translations(db, &[id]).await?,
        amenity,
    })
}

// ============================================================================
// Admin
// ============================================================================

/// POST /admin/amenities
pub async fn create_amenity(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    ValidatedJson(req): ValidatedJson<CreateAmenityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_admin()?;

    let mut tx = state.db.begin().await?;

    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO amenities (id, slug, icon) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(&req.slug)
    .bind(&req.icon)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match crate::db::sqlstate(&e).as_deref() {
        Some("23505") => ApiError::conflict(format!("Amenity '{}' already exists", req.slug)),
        _ => e.into(),
    })?;

    sqlx::query("INSERT INTO amenity_translations (amenity_id, locale, name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(&state.settings.default_locale)
        .bind(&req.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(user_id = %admin.user_id(), amenity_id = %id, slug = %req.slug, "Amenity created");

    Ok(Created(load_admin(&state.db, id).await?))
}

/// GET /admin/amenities
pub async fn list_amenities(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
) -> Result<impl IntoResponse, ApiError> {
    let amenities: Vec<Amenity> =
        sqlx::query_as("SELECT id, slug, icon, created_at FROM amenities ORDER BY slug")
            .fetch_all(&state.db)
            .await?;

    let ids: Vec<Uuid> = amenities.iter().map(|a| a.id).collect();
    let mut translations = group_by_parent(load_translations(&state.db, &ids).await?, |t| t.amenity_id);

    let data: Vec<AmenityAdminResponse> = amenities
        .into_iter()
        .map(|amenity| AmenityAdminResponse {
            translations: translations.remove(&amenity.id).unwrap_or_default(),
            amenity,
        })
        .collect();

    Ok(DataResponse::new(data))
}

/// GET /admin/amenities/:id
pub async fn get_amenity(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(load_admin(&state.db, id).await?))
}

/// PUT /admin/amenities/:id
pub async fn update_amenity(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateAmenityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_admin()?;

    let result = sqlx::query(
        "UPDATE amenities SET slug = COALESCE($2, slug), icon = COALESCE($3, icon) WHERE id = $1",
    )
    .bind(id)
    .bind(&req.slug)
    .bind(&req.icon)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Amenity not found"));
    }

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), amenity_id = %id, "Amenity updated");

    Ok(DataResponse::new(load_admin(&state.db, id).await?))
}

/// DELETE /admin/amenities/:id
pub async fn delete_amenity(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_admin()?;

    let result = sqlx::query("DELETE FROM amenities WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Amenity not found"));
    }

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), amenity_id = %id, "Amenity deleted");

    Ok(NoContent)
}

/// PUT /admin/amenities/:id/translations/:locale
pub async fn upsert_translation(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path((id, locale)): Path<(Uuid, String)>,
    ValidatedJson(req): ValidatedJson<AmenityTranslationInput>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_admin()?;
    let locale = checked_locale(&locale, &state.settings.supported_locales)?;

    let translation: AmenityTranslation = sqlx::query_as(
        r#"
        INSERT INTO amenity_translations (amenity_id, locale, name)
        VALUES ($1, $2, $3)
        ON CONFLICT (amenity_id, locale) DO UPDATE SET name = EXCLUDED.name
        RETURNING amenity_id, locale, name
        "#,
    )
    .bind(id)
    .bind(&locale)
    .bind(&req.name)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match crate::db::sqlstate(&e).as_deref() {
        Some("23503") => ApiError::not_found("Amenity not found"),
        _ => e.into(),
    })?;

    state.cache.invalidate_public().await;
    Ok(DataResponse::new(translation))
}

/// PUT /admin/projects/:id/amenities
///
/// Replaces the project's amenity set.
pub async fn set_project_amenities(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<SetProjectAmenitiesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let mut ids = req.amenity_ids.clone();
    ids.sort();
    ids.dedup();

    let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM amenities WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(&state.db)
        .await?;
    if known as usize != ids.len() {
        return Err(ApiError::bad_request("One or more amenities do not exist"));
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM project_amenities WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "INSERT INTO project_amenities (project_id, amenity_id) SELECT $1, UNNEST($2::uuid[])",
    )
    .bind(project_id)
    .bind(&ids)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %project_id,
        count = ids.len(),
        "Project amenities replaced"
    );

    Ok(DataResponse::new(ids))
}

// ============================================================================
// Public
// ============================================================================

/// GET /public/amenities
pub async fn list_public_amenities(
    State(state): State<Arc<AppState>>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let amenities: Vec<Amenity> =
        sqlx::query_as("SELECT id, slug, icon, created_at FROM amenities ORDER BY slug")
            .fetch_all(&state.db)
            .await?;

    let ids: Vec<Uuid> = amenities.iter().map(|a| a.id).collect();
    let translations = group_by_parent(load_translations(&state.db, &ids).await?, |t| t.amenity_id);

    let mut data: Vec<AmenityPublicResponse> = amenities
        .iter()
        .map(|a| {
            let own = translations.get(&a.id).map(Vec::as_slice).unwrap_or_default();
            AmenityPublicResponse::localize(a, own, &locale)
        })
        .collect();
    data.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    Ok(DataResponse::new(data))
}
