//! Developer routes
//!
//! Admin CRUD for developers plus the public directory.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAdmin;
use crate::domain::developers::{
    CreateDeveloperRequest, Developer, DeveloperAdminResponse, DeveloperPublicResponse,
    DeveloperTranslation, DeveloperTranslationInput, UpdateDeveloperRequest,
};
use crate::domain::i18n::{checked_locale, group_by_parent, Locale};
use crate::domain::slugify;
use crate::error::ApiError;
use crate::services::cache::keys;

const COLUMNS: &str = "id, slug, logo_url, website, email, phone, created_at, updated_at";

async fn load_translations(
    db: &sqlx::PgPool,
    ids: &[Uuid],
) -> Result<Vec<DeveloperTranslation>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT developer_id, locale, name, description
        FROM developer_translations
        WHERE developer_id = ANY($1)
        ORDER BY locale
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
}

async fn load_admin(db: &sqlx::PgPool, id: Uuid) -> Result<DeveloperAdminResponse, ApiError> {
    let developer: Developer = sqlx::query_as(&format!("SELECT {COLUMNS} FROM developers WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Developer not found"))?;

    let translations = load_translations(db, &[id]).await?;
    Ok(DeveloperAdminResponse {
        developer,
        translations,
    })
}

// ============================================================================
// Admin
// ============================================================================

/// POST /admin/developers
pub async fn create_developer(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    ValidatedJson(req): ValidatedJson<CreateDeveloperRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_admin()?;

    let slug = req.slug.clone().unwrap_or_else(|| slugify(&req.name));
    if slug.is_empty() {
        return Err(ApiError::validation_with(
            "A slug could not be derived from the name",
            json!({ "slug": ["slug is required"] }),
        ));
    }

    let mut tx = state.db.begin().await?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO developers (id, slug, logo_url, website, email, phone)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&slug)
    .bind(&req.logo_url)
    .bind(&req.website)
    .bind(&req.email)
    .bind(&req.phone)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| slug_conflict(e, &slug))?;

    sqlx::query(
        r#"
        INSERT INTO developer_translations (developer_id, locale, name, description)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(id)
    .bind(&state.settings.default_locale)
    .bind(&req.name)
    .bind(&req.description)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %admin.user_id(), developer_id = %id, slug = %slug, "Developer created");

    Ok(Created(load_admin(&state.db, id).await?))
}

/// GET /admin/developers
pub async fn list_developers(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = admin.developer_scope();

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM developers WHERE ($1::uuid IS NULL OR id = $1)")
            .bind(scope)
            .fetch_one(&state.db)
            .await?;

    let developers: Vec<Developer> = sqlx::query_as(&format!(
        r#"
        SELECT {COLUMNS} FROM developers
        WHERE ($1::uuid IS NULL OR id = $1)
        ORDER BY slug
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(scope)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let ids: Vec<Uuid> = developers.iter().map(|d| d.id).collect();
    let mut translations = group_by_parent(load_translations(&state.db, &ids).await?, |t| t.developer_id);

    let data = developers
        .into_iter()
        .map(|developer| DeveloperAdminResponse {
            translations: translations.remove(&developer.id).unwrap_or_default(),
            developer,
        })
        .collect();

    Ok(Paginated::new(data, &pagination, total))
}

/// GET /admin/developers/:id
pub async fn get_developer(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_developer(id)?;
    Ok(DataResponse::new(load_admin(&state.db, id).await?))
}

/// PUT /admin/developers/:id
pub async fn update_developer(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateDeveloperRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_admin()?;

    let updated = sqlx::query(
        r#"
        UPDATE developers SET
            slug = COALESCE($2, slug),
            logo_url = COALESCE($3, logo_url),
            website = COALESCE($4, website),
            email = COALESCE($5, email),
            phone = COALESCE($6, phone),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&req.slug)
    .bind(&req.logo_url)
    .bind(&req.website)
    .bind(&req.email)
    .bind(&req.phone)
    .execute(&state.db)
    .await
    .map_err(|e| slug_conflict(e, req.slug.as_deref().unwrap_or_default()))?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Developer not found"));
    }

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), developer_id = %id, "Developer updated");

    Ok(DataResponse::new(load_admin(&state.db, id).await?))
}

/// DELETE /admin/developers/:id
///
/// Refused while the developer still owns projects.
pub async fn delete_developer(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_admin()?;

    let projects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE developer_id = $1")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if projects > 0 {
        return Err(ApiError::conflict(format!(
            "Developer still has {projects} projects; delete or reassign them first"
        )));
    }

    let result = sqlx::query("DELETE FROM developers WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Developer not found"));
    }

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), developer_id = %id, "Developer deleted");

    Ok(NoContent)
}

/// PUT /admin/developers/:id/translations/:locale
pub async fn upsert_translation(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path((id, locale)): Path<(Uuid, String)>,
    ValidatedJson(req): ValidatedJson<DeveloperTranslationInput>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_developer(id)?;
    let locale = checked_locale(&locale, &state.settings.supported_locales)?;

    let translation: DeveloperTranslation = sqlx::query_as(
        r#"
        INSERT INTO developer_translations (developer_id, locale, name, description)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (developer_id, locale)
        DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description
        RETURNING developer_id, locale, name, description
        "#,
    )
    .bind(id)
    .bind(&locale)
    .bind(&req.name)
    .bind(&req.description)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match crate::db::sqlstate(&e).as_deref() {
        Some("23503") => ApiError::not_found("Developer not found"),
        _ => e.into(),
    })?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), developer_id = %id, locale = %locale, "Developer translation saved");

    Ok(DataResponse::new(translation))
}

fn slug_conflict(err: sqlx::Error, slug: &str) -> ApiError {
    match crate::db::sqlstate(&err).as_deref() {
        Some("23505") => ApiError::conflict(format!("Slug '{slug}' is already taken")),
        _ => err.into(),
    }
}

// ============================================================================
// Public
// ============================================================================

/// GET /public/developers
pub async fn list_public_developers(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM developers")
        .fetch_one(&state.db)
        .await?;

    let developers: Vec<Developer> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM developers ORDER BY slug LIMIT $1 OFFSET $2"
    ))
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let ids: Vec<Uuid> = developers.iter().map(|d| d.id).collect();
    let translations = group_by_parent(load_translations(&state.db, &ids).await?, |t| t.developer_id);

    let data = developers
        .iter()
        .map(|d| {
            let own = translations.get(&d.id).map(Vec::as_slice).unwrap_or_default();
            DeveloperPublicResponse::localize(d, own, &locale)
        })
        .collect();

    Ok(Paginated::new(data, &pagination, total))
}

/// GET /public/developers/:slug
pub async fn get_public_developer(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cache_key = keys::public_developer(&slug, &locale.tag);
    if let Some(cached) = state.cache.get::<DeveloperPublicResponse>(&cache_key).await {
        return Ok(DataResponse::new(cached));
    }

    let developer: Developer = sqlx::query_as(&format!("SELECT {COLUMNS} FROM developers WHERE slug = $1"))
        .bind(&slug)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Developer not found"))?;

    let translations = load_translations(&state.db, &[developer.id]).await?;
    let published: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM projects WHERE developer_id = $1 AND is_published",
    )
    .bind(developer.id)
    .fetch_one(&state.db)
    .await?;

    let mut response = DeveloperPublicResponse::localize(&developer, &translations, &locale);
    response.published_projects = Some(published);

    if let Err(e) = state.cache.set(&cache_key, &response).await {
        tracing::warn!(error = %e, key = %cache_key, "Failed to cache developer page");
    }

    Ok(DataResponse::new(response))
}
