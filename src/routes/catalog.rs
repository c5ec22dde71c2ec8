//! Public catalog routes
//!
//! Read-only, unauthenticated views of published projects. Text is resolved
//! for the request locale; project pages are cached per locale.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::domain::amenities::{Amenity, AmenityPublicResponse};
use crate::domain::developers::{Developer, DeveloperPublicResponse, DeveloperTranslation};
use crate::domain::i18n::{group_by_parent, Locale};
use crate::domain::layouts::{LayoutPublicResponse, LayoutTranslation, UnitLayout};
use crate::domain::locations::Location;
use crate::domain::media::{MediaResponse, MediaRow};
use crate::domain::parse_text;
use crate::domain::projects::{
    BuildingPublicResponse, LocalizedText, PriceSummary, ProjectDetailResponse, ProjectRow,
    ProjectSummaryResponse, PublicProjectQuery,
};
use crate::domain::units::{PublicUnit, PublicUnitQuery, UnitStatus};
use crate::error::ApiError;
use crate::routes::{amenities, projects};
use crate::services::cache::keys;

/// Catalog card row with aggregates over available units
#[derive(Debug, sqlx::FromRow)]
struct ProjectCardRow {
    id: Uuid,
    slug: String,
    status: String,
    completion_date: Option<NaiveDate>,
    currency: String,
    city: Option<String>,
    country: Option<String>,
    developer_slug: String,
    cover_image_url: Option<String>,
    #[sqlx(flatten)]
    prices: PriceSummary,
}

const CARD_FILTER: &str = r#"
    FROM projects p
    JOIN developers d ON d.id = p.developer_id
    LEFT JOIN locations l ON l.id = p.location_id
    LEFT JOIN LATERAL (
        SELECT MIN(u.price) AS min_price, MAX(u.price) AS max_price, COUNT(*) AS available_units
        FROM units u
        WHERE u.project_id = p.id AND u.status = 'available'
    ) s ON TRUE
    WHERE p.is_published
      AND ($1::text IS NULL OR lower(l.city) = lower($1))
      AND ($2::text IS NULL OR lower(l.country) = lower($2))
      AND ($3::text IS NULL OR d.slug = $3)
      AND ($4::text IS NULL OR p.status = $4)
      AND ($5::numeric IS NULL OR s.max_price >= $5)
      AND ($6::numeric IS NULL OR s.min_price <= $6)
      AND ($7::int IS NULL OR EXISTS (
            SELECT 1 FROM units u
            WHERE u.project_id = p.id AND u.status = 'available' AND u.bedrooms >= $7))
      AND ($8::text IS NULL OR EXISTS (
            SELECT 1 FROM project_translations t
            WHERE t.project_id = p.id AND t.title ILIKE $8))
"#;

/// GET /public/projects
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    Query(filter): Query<PublicProjectQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let status = filter.status.map(|s| s.as_str());
    let search = filter
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(crate::db::like_contains);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {CARD_FILTER}"))
        .bind(&filter.city)
        .bind(&filter.country)
        .bind(&filter.developer)
        .bind(status)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.bedrooms)
        .bind(&search)
        .fetch_one(&state.db)
        .await?;

    let rows: Vec<ProjectCardRow> = sqlx::query_as(&format!(
        r#"
        SELECT p.id, p.slug, p.status, p.completion_date, p.currency,
               l.city, l.country, d.slug AS developer_slug,
               (SELECT m.url FROM media m
                WHERE m.project_id = p.id AND m.kind = 'image'
                ORDER BY m.is_cover DESC, m.sort_order, m.created_at
                LIMIT 1) AS cover_image_url,
               s.min_price, s.max_price, s.available_units
        {CARD_FILTER}
        ORDER BY p.updated_at DESC
        LIMIT $9 OFFSET $10
        "#
    ))
    .bind(&filter.city)
    .bind(&filter.country)
    .bind(&filter.developer)
    .bind(status)
    .bind(filter.min_price)
    .bind(filter.max_price)
    .bind(filter.bedrooms)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let translations = group_by_parent(projects::load_translations(&state.db, &ids).await?, |t| t.project_id);

    let data: Vec<ProjectSummaryResponse> = rows
        .into_iter()
        .map(|row| {
            let own = translations.get(&row.id).map(Vec::as_slice).unwrap_or_default();
            let text = LocalizedText::from_translations(&row.slug, own, &locale);
            ProjectSummaryResponse {
                slug: row.slug,
                title: text.title,
                short_description: text.short_description,
                status: parse_text(&row.status),
                completion_date: row.completion_date,
                currency: row.currency,
                city: row.city,
                country: row.country,
                developer_slug: row.developer_slug,
                cover_image_url: row.cover_image_url,
                prices: row.prices,
            }
        })
        .collect();

    Ok(Paginated::new(data, &pagination, total))
}

#[derive(Debug, sqlx::FromRow)]
struct BuildingAvailabilityRow {
    id: Uuid,
    name: String,
    floors: Option<i32>,
    completion_date: Option<NaiveDate>,
    available_units: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LayoutAvailabilityRow {
    layout_id: Uuid,
    available_units: i64,
    min_price: Option<Decimal>,
}

async fn published_project(db: &sqlx::PgPool, slug: &str) -> Result<ProjectRow, ApiError> {
    sqlx::query_as(&format!(
        "SELECT {} FROM projects WHERE slug = $1 AND is_published",
        projects::COLUMNS
    ))
    .bind(slug)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Project not found"))
}

/// Assemble the localized project page
async fn load_detail(
    db: &sqlx::PgPool,
    project: ProjectRow,
    locale: &Locale,
) -> Result<ProjectDetailResponse, ApiError> {
    let id = project.id;

    let translations = projects::load_translations(db, &[id]).await?;
    let text = LocalizedText::from_translations(&project.slug, &translations, locale);

    let developer: Developer = sqlx::query_as(
        "SELECT id, slug, logo_url, website, email, phone, created_at, updated_at FROM developers WHERE id = $1",
    )
    .bind(project.developer_id)
    .fetch_one(db)
    .await?;
    let developer_translations: Vec<DeveloperTranslation> = sqlx::query_as(
        "SELECT developer_id, locale, name, description FROM developer_translations WHERE developer_id = $1",
    )
    .bind(developer.id)
    .fetch_all(db)
    .await?;

    let location: Option<Location> = match project.location_id {
        Some(location_id) => sqlx::query_as(
            "SELECT id, country, city, district, address, latitude, longitude, created_at, updated_at FROM locations WHERE id = $1",
        )
        .bind(location_id)
        .fetch_optional(db)
        .await?,
        None => None,
    };

    let amenity_rows: Vec<Amenity> = sqlx::query_as(
        r#"
        SELECT a.id, a.slug, a.icon, a.created_at
        FROM amenities a
        JOIN project_amenities pa ON pa.amenity_id = a.id
        WHERE pa.project_id = $1
        ORDER BY a.slug
        "#,
    )
    .bind(id)
    .fetch_all(db)
    .await?;
    let amenity_ids: Vec<Uuid> = amenity_rows.iter().map(|a| a.id).collect();
    let amenity_translations =
        group_by_parent(amenities::load_translations(db, &amenity_ids).await?, |t| t.amenity_id);
    let amenities = amenity_rows
        .iter()
        .map(|a| {
            let own = amenity_translations.get(&a.id).map(Vec::as_slice).unwrap_or_default();
            AmenityPublicResponse::localize(a, own, locale)
        })
        .collect();

    let buildings: Vec<BuildingAvailabilityRow> = sqlx::query_as(
        r#"
        SELECT b.id, b.name, b.floors, b.completion_date,
               COUNT(u.id) FILTER (WHERE u.status = 'available') AS available_units
        FROM buildings b
        LEFT JOIN units u ON u.building_id = b.id
        WHERE b.project_id = $1
        GROUP BY b.id
        ORDER BY b.name
        "#,
    )
    .bind(id)
    .fetch_all(db)
    .await?;

    let layouts: Vec<UnitLayout> = sqlx::query_as(
        r#"
        SELECT id, project_id, name, bedrooms, bathrooms, area, floor_plan_url, created_at, updated_at
        FROM unit_layouts
        WHERE project_id = $1
        ORDER BY bedrooms NULLS LAST, name
        "#,
    )
    .bind(id)
    .fetch_all(db)
    .await?;
    let layout_ids: Vec<Uuid> = layouts.iter().map(|l| l.id).collect();
    let layout_translations: Vec<LayoutTranslation> = sqlx::query_as(
        "SELECT layout_id, locale, name, description FROM unit_layout_translations WHERE layout_id = ANY($1)",
    )
    .bind(&layout_ids)
    .fetch_all(db)
    .await?;
    let layout_translations = group_by_parent(layout_translations, |t| t.layout_id);
    let availability: Vec<LayoutAvailabilityRow> = sqlx::query_as(
        r#"
        SELECT layout_id, COUNT(*) AS available_units, MIN(price) AS min_price
        FROM units
        WHERE project_id = $1 AND layout_id IS NOT NULL AND status = 'available'
        GROUP BY layout_id
        "#,
    )
    .bind(id)
    .fetch_all(db)
    .await?;
    let availability: HashMap<Uuid, LayoutAvailabilityRow> =
        availability.into_iter().map(|a| (a.layout_id, a)).collect();

    let layouts = layouts
        .iter()
        .map(|l| {
            let own = layout_translations.get(&l.id).map(Vec::as_slice).unwrap_or_default();
            let stats = availability.get(&l.id);
            LayoutPublicResponse::localize(
                l,
                own,
                locale,
                stats.map(|s| s.available_units).unwrap_or(0),
                stats.and_then(|s| s.min_price),
            )
        })
        .collect();

    let media: Vec<MediaRow> = sqlx::query_as(
        r#"
        SELECT id, project_id, building_id, layout_id, kind, url, storage_path, content_type,
               size_bytes, alt_text, sort_order, is_cover, created_at
        FROM media
        WHERE project_id = $1
        ORDER BY is_cover DESC, sort_order, created_at
        "#,
    )
    .bind(id)
    .fetch_all(db)
    .await?;

    let prices: PriceSummary = sqlx::query_as(
        r#"
        SELECT MIN(price) AS min_price, MAX(price) AS max_price, COUNT(*) AS available_units
        FROM units
        WHERE project_id = $1 AND status = 'available'
        "#,
    )
    .bind(id)
    .fetch_one(db)
    .await?;

    Ok(ProjectDetailResponse {
        slug: project.slug,
        text,
        status: parse_text(&project.status),
        completion_date: project.completion_date,
        currency: project.currency,
        developer: DeveloperPublicResponse::localize(&developer, &developer_translations, locale),
        location,
        amenities,
        buildings: buildings
            .into_iter()
            .map(|b| BuildingPublicResponse {
                id: b.id,
                name: b.name,
                floors: b.floors,
                completion_date: b.completion_date,
                available_units: b.available_units,
            })
            .collect(),
        layouts,
        media: media.into_iter().map(MediaResponse::from).collect(),
        prices,
    })
}

/// GET /public/projects/:slug
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    locale: Locale,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cache_key = keys::public_project(&slug, &locale.tag);
    if let Some(cached) = state.cache.get::<ProjectDetailResponse>(&cache_key).await {
        return Ok(DataResponse::new(cached));
    }

    let project = published_project(&state.db, &slug).await?;
    let detail = load_detail(&state.db, project, &locale).await?;

    if let Err(e) = state.cache.set(&cache_key, &detail).await {
        tracing::warn!(error = %e, key = %cache_key, "Failed to cache project page");
    }

    Ok(DataResponse::new(detail))
}

/// GET /public/projects/:slug/units
///
/// Units marked unavailable are never listed.
pub async fn list_units(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(filter): Query<PublicUnitQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let project = published_project(&state.db, &slug).await?;

    if filter.status.is_some_and(|s| !s.is_public()) {
        return Ok(Paginated::new(Vec::<PublicUnit>::new(), &pagination, 0));
    }
    let status = filter.status.map(|s| s.as_str());

    let where_clause = format!(
        r#"
        WHERE u.project_id = $1
          AND u.status <> '{hidden}'
          AND ($2::uuid IS NULL OR u.building_id = $2)
          AND ($3::uuid IS NULL OR u.layout_id = $3)
          AND ($4::text IS NULL OR u.status = $4)
          AND ($5::int IS NULL OR u.bedrooms = $5)
          AND ($6::numeric IS NULL OR u.price >= $6)
          AND ($7::numeric IS NULL OR u.price <= $7)
        "#,
        hidden = UnitStatus::Unavailable.as_str()
    );

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM units u {where_clause}"))
        .bind(project.id)
        .bind(filter.building_id)
        .bind(filter.layout_id)
        .bind(status)
        .bind(filter.bedrooms)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .fetch_one(&state.db)
        .await?;

    let units: Vec<PublicUnit> = sqlx::query_as(&format!(
        r#"
        SELECT u.id, u.unit_number, b.name AS building_name, u.layout_id, u.floor,
               u.bedrooms, u.bathrooms, u.area, u.price, u.currency, u.status,
               u.view, u.orientation
        FROM units u
        LEFT JOIN buildings b ON b.id = u.building_id
        {where_clause}
        ORDER BY b.name NULLS LAST, u.floor NULLS LAST, u.unit_number
        LIMIT $8 OFFSET $9
        "#
    ))
    .bind(project.id)
    .bind(filter.building_id)
    .bind(filter.layout_id)
    .bind(status)
    .bind(filter.bedrooms)
    .bind(filter.min_price)
    .bind(filter.max_price)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(units, &pagination, total))
}
