//! Project (development listing) domain types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::amenities::AmenityPublicResponse;
use super::developers::DeveloperPublicResponse;
use super::i18n::{Locale, Localized};
use super::layouts::LayoutPublicResponse;
use super::locations::Location;
use super::media::MediaResponse;
use super::{parse_text, text_enum, validate_currency, validate_slug};

text_enum! {
    /// Construction / sales stage of a project
    ProjectStatus {
        Planned => "planned",
        UnderConstruction => "under_construction",
        Completed => "completed",
        SoldOut => "sold_out",
    } default Planned
}

/// Project row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub slug: String,
    pub developer_id: Uuid,
    pub location_id: Option<Uuid>,
    pub status: String,
    pub is_published: bool,
    pub currency: String,
    pub completion_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub slug: String,
    pub developer_id: Uuid,
    pub location_id: Option<Uuid>,
    pub status: ProjectStatus,
    pub is_published: bool,
    pub currency: String,
    pub completion_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(r: ProjectRow) -> Self {
        Self {
            id: r.id,
            slug: r.slug,
            developer_id: r.developer_id,
            location_id: r.location_id,
            status: parse_text(&r.status),
            is_published: r.is_published,
            currency: r.currency,
            completion_date: r.completion_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectTranslation {
    #[serde(skip_serializing, default)]
    pub project_id: Uuid,
    pub locale: String,
    pub title: String,
    pub short_description: Option<String>,
    pub description: Option<String>,
}

impl Localized for ProjectTranslation {
    fn locale(&self) -> &str {
        &self.locale
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProjectTranslationInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub short_description: Option<String>,
    #[validate(length(max = 50000))]
    #[serde(default)]
    pub description: Option<String>,
}

/// Request DTO for creating a project. The translation is stored under
/// the default locale.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProjectRequest {
    pub developer_id: Uuid,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[validate(custom(function = "validate_slug"))]
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[validate(custom(function = "validate_currency"))]
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    #[validate(nested)]
    pub translation: ProjectTranslationInput,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub developer_id: Option<Uuid>,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[validate(custom(function = "validate_slug"))]
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[validate(custom(function = "validate_currency"))]
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}

/// Machine-translate a project's text into another locale
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AutoTranslateRequest {
    /// Defaults to the platform default locale
    #[validate(length(min = 2, max = 20))]
    #[serde(default)]
    pub source_locale: Option<String>,
    #[validate(length(min = 2, max = 20))]
    pub target_locale: String,
    #[serde(default)]
    pub overwrite: bool,
}

/// Admin listing filters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminProjectQuery {
    #[serde(default)]
    pub developer_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub published: Option<bool>,
    /// Matches slug or any translated title
    #[serde(default)]
    pub q: Option<String>,
}

/// Public catalog filters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PublicProjectQuery {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub developer: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub bedrooms: Option<i32>,
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectAdminResponse {
    #[serde(flatten)]
    pub project: Project,
    pub translations: Vec<ProjectTranslation>,
    pub amenity_ids: Vec<Uuid>,
    pub unit_count: i64,
}

/// Aggregates over a project's available units
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct PriceSummary {
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub available_units: i64,
}

/// Resolved title/description for one locale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalizedText {
    pub locale: Option<String>,
    pub title: String,
    pub short_description: Option<String>,
    pub description: Option<String>,
}

impl LocalizedText {
    pub fn from_translations(slug: &str, translations: &[ProjectTranslation], locale: &Locale) -> Self {
        match locale.pick(translations) {
            Some(t) => Self {
                locale: Some(t.locale.clone()),
                title: t.title.clone(),
                short_description: t.short_description.clone(),
                description: t.description.clone(),
            },
            None => Self {
                locale: None,
                title: slug.to_string(),
                short_description: None,
                description: None,
            },
        }
    }
}

/// Public catalog card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummaryResponse {
    pub slug: String,
    pub title: String,
    pub short_description: Option<String>,
    pub status: ProjectStatus,
    pub completion_date: Option<NaiveDate>,
    pub currency: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub developer_slug: String,
    pub cover_image_url: Option<String>,
    pub prices: PriceSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingPublicResponse {
    pub id: Uuid,
    pub name: String,
    pub floors: Option<i32>,
    pub completion_date: Option<NaiveDate>,
    pub available_units: i64,
}

/// Public project page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetailResponse {
    pub slug: String,
    #[serde(flatten)]
    pub text: LocalizedText,
    pub status: ProjectStatus,
    pub completion_date: Option<NaiveDate>,
    pub currency: String,
    pub developer: DeveloperPublicResponse,
    pub location: Option<Location>,
    pub amenities: Vec<AmenityPublicResponse>,
    pub buildings: Vec<BuildingPublicResponse>,
    pub layouts: Vec<LayoutPublicResponse>,
    pub media: Vec<MediaResponse>,
    pub prices: PriceSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation(locale: &str, title: &str) -> ProjectTranslation {
        ProjectTranslation {
            project_id: Uuid::nil(),
            locale: locale.into(),
            title: title.into(),
            short_description: None,
            description: None,
        }
    }

    #[test]
    fn localized_text_prefers_requested_locale() {
        let translations = vec![translation("en", "Sea View"), translation("ru", "Вид на море")];
        let text = LocalizedText::from_translations(
            "sea-view",
            &translations,
            &Locale {
                tag: "ru".into(),
                default: "en".into(),
            },
        );
        assert_eq!(text.title, "Вид на море");
        assert_eq!(text.locale.as_deref(), Some("ru"));
    }

    #[test]
    fn localized_text_without_translations_uses_slug() {
        let text = LocalizedText::from_translations(
            "sea-view",
            &[],
            &Locale {
                tag: "en".into(),
                default: "en".into(),
            },
        );
        assert_eq!(text.title, "sea-view");
        assert!(text.locale.is_none());
    }

    #[test]
    fn create_request_validates_nested_translation() {
        let req: CreateProjectRequest = serde_json::from_value(serde_json::json!({
            "developer_id": Uuid::new_v4(),
            "currency": "eur",
            "translation": { "title": "" }
        }))
        .unwrap();
        assert_eq!(req.status, ProjectStatus::Planned);
        let errors = req.validate().unwrap_err();
        let all = errors.errors();
        assert!(all.contains_key("currency"));
        assert!(all.contains_key("translation"));
    }
}
