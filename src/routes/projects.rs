//! Project routes (admin)
//!
//! CRUD, publishing and per-locale text for development listings.

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
use crate::domain::i18n::{checked_locale, group_by_parent, normalize_tag};
use crate::domain::projects::{
    AdminProjectQuery, AutoTranslateRequest, CreateProjectRequest, Project,
    ProjectAdminResponse, ProjectRow, ProjectTranslation, ProjectTranslationInput,
    PublishRequest, UpdateProjectRequest,
};
use crate::domain::slugify;
use crate::error::ApiError;

pub(crate) const COLUMNS: &str = "id, slug, developer_id, location_id, status, is_published, currency, completion_date, created_at, updated_at";

const DEFAULT_CURRENCY: &str = "EUR";

pub(crate) async fn load_translations(
    db: &sqlx::PgPool,
    ids: &[Uuid],
) -> Result<Vec<ProjectTranslation>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT project_id, locale, title, short_description, description
        FROM project_translations
        WHERE project_id = ANY($1)
        ORDER BY locale
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
}

async fn load_admin(db: &sqlx::PgPool, id: Uuid) -> Result<ProjectAdminResponse, ApiError> {
    let row: ProjectRow = sqlx::query_as(&format!("SELECT {COLUMNS} FROM projects WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    let translations = load_translations(db, &[id]).await?;
    let amenity_ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT amenity_id FROM project_amenities WHERE project_id = $1 ORDER BY amenity_id",
    )
    .bind(id)
    .fetch_all(db)
    .await?;
    let unit_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM units WHERE project_id = $1")
        .bind(id)
        .fetch_one(db)
        .await?;

    Ok(ProjectAdminResponse {
        project: row.into(),
        translations,
        amenity_ids,
        unit_count,
    })
}

fn slug_conflict(err: sqlx::Error, slug: &str) -> ApiError {
    match crate::db::sqlstate(&err).as_deref() {
        Some("23505") => ApiError::conflict(format!("Slug '{slug}' is already taken")),
        _ => err.into(),
    }
}

/// POST /admin/projects
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    ValidatedJson(req): ValidatedJson<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.ensure_developer(req.developer_id)?;

    let slug = req
        .slug
        .clone()
        .unwrap_or_else(|| slugify(&req.translation.title));
    if slug.is_empty() {
        return Err(ApiError::validation_with(
            "A slug could not be derived from the title",
            json!({ "slug": ["slug is required"] }),
        ));
    }

    let mut tx = state.db.begin().await?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO projects (id, slug, developer_id, location_id, status, currency, completion_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&slug)
    .bind(req.developer_id)
    .bind(req.location_id)
    .bind(req.status.as_str())
    .bind(req.currency.as_deref().unwrap_or(DEFAULT_CURRENCY))
    .bind(req.completion_date)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| slug_conflict(e, &slug))?;

    sqlx::query(
        r#"
        INSERT INTO project_translations (project_id, locale, title, short_description, description)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(&state.settings.default_locale)
    .bind(&req.translation.title)
    .bind(&req.translation.short_description)
    .bind(&req.translation.description)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %id,
        developer_id = %req.developer_id,
        slug = %slug,
        "Project created"
    );

    Ok(Created(load_admin(&state.db, id).await?))
}

/// GET /admin/projects
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Query(filter): Query<AdminProjectQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = admin.developer_scope();
    let status = filter.status.map(|s| s.as_str());
    let search = filter
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(crate::db::like_contains);

    let where_clause = r#"
        WHERE ($1::uuid IS NULL OR p.developer_id = $1)
          AND ($2::uuid IS NULL OR p.developer_id = $2)
          AND ($3::text IS NULL OR p.status = $3)
          AND ($4::bool IS NULL OR p.is_published = $4)
          AND ($5::text IS NULL OR p.slug ILIKE $5 OR EXISTS (
                SELECT 1 FROM project_translations t
                WHERE t.project_id = p.id AND t.title ILIKE $5))
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM projects p {where_clause}"))
        .bind(scope)
        .bind(filter.developer_id)
        .bind(status)
        .bind(filter.published)
        .bind(&search)
        .fetch_one(&state.db)
        .await?;

    let rows: Vec<ProjectRow> = sqlx::query_as(&format!(
        r#"
        SELECT p.id, p.slug, p.developer_id, p.location_id, p.status, p.is_published,
               p.currency, p.completion_date, p.created_at, p.updated_at
        FROM projects p
        {where_clause}
        ORDER BY p.updated_at DESC
        LIMIT $6 OFFSET $7
        "#
    ))
    .bind(scope)
    .bind(filter.developer_id)
    .bind(status)
    .bind(filter.published)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut translations = group_by_parent(load_translations(&state.db, &ids).await?, |t| t.project_id);

    let counts: Vec<(Uuid, i64)> = sqlx::query_as(
        "SELECT project_id, COUNT(*) FROM units WHERE project_id = ANY($1) GROUP BY project_id",
    )
    .bind(&ids)
    .fetch_all(&state.db)
    .await?;
    let counts: std::collections::HashMap<Uuid, i64> = counts.into_iter().collect();

    let amenities: Vec<(Uuid, Uuid)> = sqlx::query_as(
        "SELECT project_id, amenity_id FROM project_amenities WHERE project_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(&state.db)
    .await?;
    let mut amenities = group_by_parent(amenities, |a| a.0);

    let data: Vec<ProjectAdminResponse> = rows
        .into_iter()
        .map(|row| {
            let id = row.id;
            ProjectAdminResponse {
                project: row.into(),
                translations: translations.remove(&id).unwrap_or_default(),
                amenity_ids: amenities
                    .remove(&id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(_, a)| a)
                    .collect(),
                unit_count: counts.get(&id).copied().unwrap_or(0),
            }
        })
        .collect();

    Ok(Paginated::new(data, &pagination, total))
}

/// GET /admin/projects/:id
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, id).await?;
    Ok(DataResponse::new(load_admin(&state.db, id).await?))
}

/// PUT /admin/projects/:id
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, id).await?;
    if let Some(developer_id) = req.developer_id {
        admin.ensure_developer(developer_id)?;
    }

    let row: ProjectRow = sqlx::query_as(&format!(
        r#"
        UPDATE projects SET
            developer_id = COALESCE($2, developer_id),
            location_id = COALESCE($3, location_id),
            slug = COALESCE($4, slug),
            status = COALESCE($5, status),
            currency = COALESCE($6, currency),
            completion_date = COALESCE($7, completion_date),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(req.developer_id)
    .bind(req.location_id)
    .bind(&req.slug)
    .bind(req.status.map(|s| s.as_str()))
    .bind(&req.currency)
    .bind(req.completion_date)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| slug_conflict(e, req.slug.as_deref().unwrap_or_default()))?
    .ok_or_else(|| ApiError::not_found("Project not found"))?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), project_id = %id, "Project updated");

    let project: Project = row.into();
    Ok(DataResponse::new(project))
}

/// DELETE /admin/projects/:id
///
/// Buildings, units, layouts and media rows go with the project. Uploaded
/// files are removed from storage afterwards.
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, id).await?;

    let owned_files: Vec<String> = sqlx::query_scalar(
        "SELECT storage_path FROM media WHERE project_id = $1 AND storage_path IS NOT NULL",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project not found"));
    }

    for path in &owned_files {
        if let Err(e) = state.storage.delete(path).await {
            tracing::warn!(error = %e, path = %path, "Failed to remove stored file of deleted project");
        }
    }

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %id,
        files = owned_files.len(),
        "Project deleted"
    );

    Ok(NoContent)
}

/// PATCH /admin/projects/:id/publish
pub async fn set_published(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    axum::Json(req): axum::Json<PublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, id).await?;

    let row: ProjectRow = sqlx::query_as(&format!(
        "UPDATE projects SET is_published = $2, updated_at = NOW() WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(req.published)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Project not found"))?;

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %id,
        published = req.published,
        "Project publication changed"
    );

    let project: Project = row.into();
    Ok(DataResponse::new(project))
}

async fn upsert_project_translation(
    db: &sqlx::PgPool,
    project_id: Uuid,
    locale: &str,
    input: &ProjectTranslationInput,
) -> Result<ProjectTranslation, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO project_translations (project_id, locale, title, short_description, description)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (project_id, locale) DO UPDATE SET
            title = EXCLUDED.title,
            short_description = EXCLUDED.short_description,
            description = EXCLUDED.description
        RETURNING project_id, locale, title, short_description, description
        "#,
    )
    .bind(project_id)
    .bind(locale)
    .bind(&input.title)
    .bind(&input.short_description)
    .bind(&input.description)
    .fetch_one(db)
    .await
}

/// PUT /admin/projects/:id/translations/:locale
pub async fn upsert_translation(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path((id, locale)): Path<(Uuid, String)>,
    ValidatedJson(req): ValidatedJson<ProjectTranslationInput>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, id).await?;
    let locale = checked_locale(&locale, &state.settings.supported_locales)?;

    let translation = upsert_project_translation(&state.db, id, &locale, &req).await?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), project_id = %id, locale = %locale, "Project translation saved");

    Ok(DataResponse::new(translation))
}

/// DELETE /admin/projects/:id/translations/:locale
///
/// A project always keeps at least one translation.
pub async fn delete_translation(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path((id, locale)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, id).await?;
    let locale = normalize_tag(&locale);

    let mut tx = state.db.begin().await?;

    // Serialize concurrent deletes on the same project
    sqlx::query("SELECT id FROM projects WHERE id = $1 FOR UPDATE")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let locales: Vec<String> =
        sqlx::query_scalar("SELECT locale FROM project_translations WHERE project_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

    if !locales.iter().any(|l| *l == locale) {
        return Err(ApiError::not_found(format!("No '{locale}' translation for this project")));
    }
    if locales.len() == 1 {
        return Err(ApiError::conflict("The last translation of a project cannot be removed"));
    }

    sqlx::query("DELETE FROM project_translations WHERE project_id = $1 AND locale = $2")
        .bind(id)
        .bind(&locale)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), project_id = %id, locale = %locale, "Project translation removed");

    Ok(NoContent)
}

/// POST /admin/projects/:id/translations/auto
pub async fn auto_translate(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AutoTranslateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let translator = state
        .translator
        .as_ref()
        .ok_or_else(|| ApiError::FeatureDisabled("Machine translation is not configured".into()))?;

    admin.authorize_project(&state.db, id).await?;

    let source_locale = normalize_tag(
        req.source_locale
            .as_deref()
            .unwrap_or(&state.settings.default_locale),
    );
    let target_locale = checked_locale(&req.target_locale, &state.settings.supported_locales)?;
    if source_locale == target_locale {
        return Err(ApiError::bad_request("Source and target locale are the same"));
    }

    let translations = load_translations(&state.db, &[id]).await?;
    let source = translations
        .iter()
        .find(|t| t.locale == source_locale)
        .ok_or_else(|| ApiError::not_found(format!("No '{source_locale}' translation to translate from")))?;

    if !req.overwrite && translations.iter().any(|t| t.locale == target_locale) {
        return Err(ApiError::conflict(format!(
            "A '{target_locale}' translation already exists; pass overwrite to replace it"
        )));
    }

    let mut texts = vec![source.title.as_str()];
    texts.extend(source.short_description.as_deref());
    texts.extend(source.description.as_deref());

    let mut translated = translator
        .translate(&texts, &source_locale, &target_locale)
        .await?
        .into_iter();

    let input = ProjectTranslationInput {
        title: translated.next().unwrap_or_default(),
        short_description: source.short_description.as_ref().and_then(|_| translated.next()),
        description: source.description.as_ref().and_then(|_| translated.next()),
    };
    let translation = upsert_project_translation(&state.db, id, &target_locale, &input).await?;

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %id,
        source = %source_locale,
        target = %target_locale,
        "Project auto-translated"
    );

    Ok(DataResponse::new(translation))
}
