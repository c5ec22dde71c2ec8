//! Project media routes (admin)
//!
//! Uploads go to object storage; linked media only records the URL. A
//! project has at most one cover.

use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
};
use sqlx::PgConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, ValidatedJson};
use crate::app::AppState;
use crate::auth::{ChildTable, RequireAdmin};
use crate::domain::media::{
    storage_path, LinkMediaRequest, MediaKind, MediaResponse, MediaRow, ReorderMediaRequest,
    UpdateMediaRequest,
};
use crate::error::ApiError;
use crate::routes::units::check_references;

const COLUMNS: &str = "id, project_id, building_id, layout_id, kind, url, storage_path, \
    content_type, size_bytes, alt_text, sort_order, is_cover, created_at";

/// Fields of a new media row
struct NewMedia<'a> {
    project_id: Uuid,
    building_id: Option<Uuid>,
    layout_id: Option<Uuid>,
    kind: MediaKind,
    url: &'a str,
    storage_path: Option<&'a str>,
    content_type: Option<&'a str>,
    size_bytes: Option<i64>,
    alt_text: Option<&'a str>,
    is_cover: bool,
}

async fn clear_cover(conn: &mut PgConnection, project_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE media SET is_cover = FALSE WHERE project_id = $1 AND is_cover")
        .bind(project_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn insert_media(db: &sqlx::PgPool, media: NewMedia<'_>) -> Result<MediaRow, ApiError> {
    let mut tx = db.begin().await?;
    check_references(&mut tx, media.project_id, media.building_id, media.layout_id).await?;

    if media.is_cover {
        clear_cover(&mut tx, media.project_id).await?;
    }

    let row: MediaRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO media (
            id, project_id, building_id, layout_id, kind, url, storage_path,
            content_type, size_bytes, alt_text, sort_order, is_cover
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
            (SELECT COALESCE(MAX(sort_order) + 1, 0) FROM media WHERE project_id = $2),
            $11
        )
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(media.project_id)
    .bind(media.building_id)
    .bind(media.layout_id)
    .bind(media.kind.as_str())
    .bind(media.url)
    .bind(media.storage_path)
    .bind(media.content_type)
    .bind(media.size_bytes)
    .bind(media.alt_text)
    .bind(media.is_cover)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::bad_request(format!("Invalid multipart body: {err}"))
}

fn parse_uuid_field(name: &str, raw: &str) -> Result<Option<Uuid>, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| ApiError::bad_request(format!("Field '{name}' is not a valid id")))
}

/// POST /admin/projects/:id/media
///
/// Multipart fields: `file` (required), `kind`, `alt_text`, `is_cover`,
/// `building_id`, `layout_id`.
pub async fn upload_media(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut kind: Option<MediaKind> = None;
    let mut alt_text: Option<String> = None;
    let mut is_cover = false;
    let mut building_id = None;
    let mut layout_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.len() > state.settings.upload_max_bytes {
                    return Err(ApiError::bad_request(format!(
                        "File exceeds the {} byte upload limit",
                        state.settings.upload_max_bytes
                    )));
                }
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            "kind" => {
                let raw = field.text().await.map_err(multipart_error)?;
                kind = Some(
                    raw.trim()
                        .parse()
                        .map_err(|e: String| ApiError::bad_request(e))?,
                );
            }
            "alt_text" => alt_text = Some(field.text().await.map_err(multipart_error)?),
            "is_cover" => {
                let raw = field.text().await.map_err(multipart_error)?;
                is_cover = matches!(raw.trim(), "true" | "1" | "on");
            }
            "building_id" => {
                building_id = parse_uuid_field("building_id", &field.text().await.map_err(multipart_error)?)?
            }
            "layout_id" => {
                layout_id = parse_uuid_field("layout_id", &field.text().await.map_err(multipart_error)?)?
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| ApiError::bad_request("Multipart field 'file' is required"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    let kind = kind.unwrap_or_else(|| MediaKind::from_content_type(&content_type));
    let size = bytes.len() as i64;
    let path = storage_path(project_id, &file_name);
    let url = state.storage.upload(&path, &content_type, bytes).await?;

    let inserted = insert_media(
        &state.db,
        NewMedia {
            project_id,
            building_id,
            layout_id,
            kind,
            url: &url,
            storage_path: Some(&path),
            content_type: Some(&content_type),
            size_bytes: Some(size),
            alt_text: alt_text.as_deref(),
            is_cover,
        },
    )
    .await;

    let row = match inserted {
        Ok(row) => row,
        Err(err) => {
            if let Err(e) = state.storage.delete(&path).await {
                tracing::warn!(error = %e, path = %path, "Failed to remove orphaned upload");
            }
            return Err(err);
        }
    };

    state.cache.invalidate_public().await;
    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %project_id,
        media_id = %row.id,
        size_bytes = size,
        kind = %kind,
        "Media uploaded"
    );

    Ok(Created(MediaResponse::from(row)))
}

/// POST /admin/projects/:id/media/link
pub async fn link_media(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<LinkMediaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let row = insert_media(
        &state.db,
        NewMedia {
            project_id,
            building_id: req.building_id,
            layout_id: req.layout_id,
            kind: req.kind,
            url: &req.url,
            storage_path: None,
            content_type: None,
            size_bytes: None,
            alt_text: req.alt_text.as_deref(),
            is_cover: req.is_cover,
        },
    )
    .await?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), project_id = %project_id, media_id = %row.id, "Media linked");

    Ok(Created(MediaResponse::from(row)))
}

/// GET /admin/projects/:id/media
pub async fn list_media(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let rows: Vec<MediaRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM media WHERE project_id = $1 ORDER BY sort_order, created_at"
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await?;

    let data: Vec<MediaResponse> = rows.into_iter().map(MediaResponse::from).collect();
    Ok(DataResponse::new(data))
}

/// PUT /admin/media/:id
pub async fn update_media(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateMediaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project_id = admin.authorize_child(&state.db, ChildTable::Media, id).await?;

    let mut tx = state.db.begin().await?;
    check_references(&mut tx, project_id, req.building_id, req.layout_id).await?;

    if req.is_cover == Some(true) {
        clear_cover(&mut tx, project_id).await?;
    }

    let row: MediaRow = sqlx::query_as(&format!(
        r#"
        UPDATE media SET
            alt_text = COALESCE($2, alt_text),
            sort_order = COALESCE($3, sort_order),
            is_cover = COALESCE($4, is_cover),
            kind = COALESCE($5, kind),
            building_id = COALESCE($6, building_id),
            layout_id = COALESCE($7, layout_id)
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&req.alt_text)
    .bind(req.sort_order)
    .bind(req.is_cover)
    .bind(req.kind.map(|k| k.as_str()))
    .bind(req.building_id)
    .bind(req.layout_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), media_id = %id, "Media updated");

    Ok(DataResponse::new(MediaResponse::from(row)))
}

/// DELETE /admin/media/:id
///
/// Uploaded files are removed from storage too; a storage failure is logged
/// and does not bring the row back.
pub async fn delete_media(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_child(&state.db, ChildTable::Media, id).await?;

    let storage_path: Option<String> =
        sqlx::query_scalar("DELETE FROM media WHERE id = $1 RETURNING storage_path")
            .bind(id)
            .fetch_one(&state.db)
            .await?;

    if let Some(path) = storage_path {
        if let Err(e) = state.storage.delete(&path).await {
            tracing::warn!(error = %e, media_id = %id, path = %path, "Failed to delete storage object");
        }
    }

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), media_id = %id, "Media deleted");

    Ok(NoContent)
}

/// PUT /admin/projects/:id/media/order
///
/// `media_ids` must list every media item of the project exactly once.
pub async fn reorder_media(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ReorderMediaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let mut tx = state.db.begin().await?;

    let mut existing: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM media WHERE project_id = $1 FOR UPDATE")
            .bind(project_id)
            .fetch_all(&mut *tx)
            .await?;
    existing.sort();
    let mut requested = req.media_ids.clone();
    requested.sort();
    if existing != requested {
        return Err(ApiError::bad_request(
            "media_ids must contain each media item of the project exactly once",
        ));
    }

    let positions: Vec<i32> = (0..req.media_ids.len() as i32).collect();
    sqlx::query(
        r#"
        UPDATE media m SET sort_order = o.position
        FROM UNNEST($1::uuid[], $2::int[]) AS o(id, position)
        WHERE m.id = o.id
        "#,
    )
    .bind(&req.media_ids)
    .bind(&positions)
    .execute(&mut *tx)
    .await?;

    let rows: Vec<MediaRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM media WHERE project_id = $1 ORDER BY sort_order"
    ))
    .bind(project_id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    state.cache.invalidate_public().await;
    tracing::info!(user_id = %admin.user_id(), project_id = %project_id, count = rows.len(), "Media reordered");

    let data: Vec<MediaResponse> = rows.into_iter().map(MediaResponse::from).collect();
    Ok(DataResponse::new(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_fields_allow_blank() {
        assert_eq!(parse_uuid_field("building_id", "  ").unwrap(), None);
        let id = Uuid::new_v4();
        assert_eq!(parse_uuid_field("building_id", &id.to_string()).unwrap(), Some(id));
        assert!(parse_uuid_field("layout_id", "nope").is_err());
    }
}
