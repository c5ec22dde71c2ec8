//! Project media (photos, videos, documents, floor plans)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{parse_text, text_enum};

text_enum! {
    MediaKind {
        Image => "image",
        Video => "video",
        Document => "document",
        FloorPlan => "floor_plan",
    } default Image
}

impl MediaKind {
    /// Guess a kind from the uploaded content type
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.starts_with("image/") {
            Self::Image
        } else if ct.starts_with("video/") {
            Self::Video
        } else {
            Self::Document
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MediaRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub building_id: Option<Uuid>,
    pub layout_id: Option<Uuid>,
    pub kind: String,
    pub url: String,
    pub storage_path: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub alt_text: Option<String>,
    pub sort_order: i32,
    pub is_cover: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub building_id: Option<Uuid>,
    pub layout_id: Option<Uuid>,
    pub kind: MediaKind,
    pub url: String,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub alt_text: Option<String>,
    pub sort_order: i32,
    pub is_cover: bool,
    pub created_at: DateTime<Utc>,
}

impl From<MediaRow> for MediaResponse {
    fn from(r: MediaRow) -> Self {
        Self {
            id: r.id,
            project_id: r.project_id,
            building_id: r.building_id,
            layout_id: r.layout_id,
            kind: parse_text(&r.kind),
            url: r.url,
            content_type: r.content_type,
            size_bytes: r.size_bytes,
            alt_text: r.alt_text,
            sort_order: r.sort_order,
            is_cover: r.is_cover,
            created_at: r.created_at,
        }
    }
}

/// Register media hosted elsewhere (YouTube tour, external PDF, ...)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LinkMediaRequest {
    #[validate(url)]
    pub url: String,
    #[serde(default)]
    pub kind: MediaKind,
    #[serde(default)]
    pub building_id: Option<Uuid>,
    #[serde(default)]
    pub layout_id: Option<Uuid>,
    #[validate(length(max = 300))]
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub is_cover: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateMediaRequest {
    #[validate(length(max = 300))]
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
    #[serde(default)]
    pub is_cover: Option<bool>,
    #[serde(default)]
    pub kind: Option<MediaKind>,
    #[serde(default)]
    pub building_id: Option<Uuid>,
    #[serde(default)]
    pub layout_id: Option<Uuid>,
}

/// Full ordering of a project's media, first id gets `sort_order = 0`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReorderMediaRequest {
    #[validate(length(min = 1, max = 500))]
    pub media_ids: Vec<Uuid>,
}

/// Storage object key for an upload: `projects/<project>/<uuid>-<safe name>`
pub fn storage_path(project_id: Uuid, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let safe = safe.trim_matches(|c| c == '-' || c == '.');
    let safe = if safe.is_empty() { "file" } else { safe };
    format!("projects/{project_id}/{}-{safe}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_content_type() {
        assert_eq!(MediaKind::from_content_type("image/webp"), MediaKind::Image);
        assert_eq!(MediaKind::from_content_type("VIDEO/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_content_type("application/pdf"), MediaKind::Document);
    }

    #[test]
    fn storage_paths_are_sanitized() {
        let project = Uuid::new_v4();
        let path = storage_path(project, "Brochure (final) v2.PDF");
        assert!(path.starts_with(&format!("projects/{project}/")));
        assert!(path.ends_with("-brochure--final--v2.pdf"));

        let fallback = storage_path(project, "../..");
        assert!(fallback.ends_with("-file"));
    }
}
