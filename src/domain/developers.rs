//! Developer (builder company) domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::i18n::{Locale, Localized};
use super::validate_slug;

/// Developer row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Developer {
    pub id: Uuid,
    pub slug: String,
    pub logo_url: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeveloperTranslation {
    #[serde(skip_serializing)]
    #[serde(default)]
    pub developer_id: Uuid,
    pub locale: String,
    pub name: String,
    pub description: Option<String>,
}

impl Localized for DeveloperTranslation {
    fn locale(&self) -> &str {
        &self.locale
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeveloperTranslationInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 20000))]
    #[serde(default)]
    pub description: Option<String>,
}

/// Request DTO for creating a developer; `name` is stored under the default locale
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDeveloperRequest {
    #[validate(custom(function = "validate_slug"))]
    #[serde(default)]
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(url)]
    #[serde(default)]
    pub logo_url: Option<String>,
    #[validate(url)]
    #[serde(default)]
    pub website: Option<String>,
    #[validate(email)]
    #[serde(default)]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateDeveloperRequest {
    #[validate(custom(function = "validate_slug"))]
    #[serde(default)]
    pub slug: Option<String>,
    #[validate(url)]
    #[serde(default)]
    pub logo_url: Option<String>,
    #[validate(url)]
    #[serde(default)]
    pub website: Option<String>,
    #[validate(email)]
    #[serde(default)]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    #[serde(default)]
    pub phone: Option<String>,
}

/// Admin view: all translations
#[derive(Debug, Clone, Serialize)]
pub struct DeveloperAdminResponse {
    #[serde(flatten)]
    pub developer: Developer,
    pub translations: Vec<DeveloperTranslation>,
}

/// Public view: one resolved translation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeveloperPublicResponse {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website: Option<String>,
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_projects: Option<i64>,
}

impl DeveloperPublicResponse {
    pub fn localize(dev: &Developer, translations: &[DeveloperTranslation], locale: &Locale) -> Self {
        let picked = locale.pick(translations);
        Self {
            slug: dev.slug.clone(),
            name: picked
                .map(|t| t.name.clone())
                .unwrap_or_else(|| dev.slug.clone()),
            description: picked.and_then(|t| t.description.clone()),
            logo_url: dev.logo_url.clone(),
            website: dev.website.clone(),
            locale: picked.map(|t| t.locale.clone()),
            published_projects: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn developer() -> Developer {
        Developer {
            id: Uuid::new_v4(),
            slug: "acme-homes".into(),
            logo_url: None,
            website: Some("https://acme.example".into()),
            email: None,
            phone: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn localize_falls_back_to_slug_without_translations() {
        let locale = Locale {
            tag: "de".into(),
            default: "en".into(),
        };
        let view = DeveloperPublicResponse::localize(&developer(), &[], &locale);
        assert_eq!(view.name, "acme-homes");
        assert!(view.locale.is_none());
    }

    #[test]
    fn localize_uses_best_translation() {
        let dev = developer();
        let translations = vec![
            DeveloperTranslation {
                developer_id: dev.id,
                locale: "en".into(),
                name: "Acme Homes".into(),
                description: None,
            },
            DeveloperTranslation {
                developer_id: dev.id,
                locale: "de".into(),
                name: "Acme Häuser".into(),
                description: Some("Bauträger".into()),
            },
        ];
        let locale = Locale {
            tag: "de".into(),
            default: "en".into(),
        };
        let view = DeveloperPublicResponse::localize(&dev, &translations, &locale);
        assert_eq!(view.name, "Acme Häuser");
        assert_eq!(view.locale.as_deref(), Some("de"));
    }

    #[test]
    fn create_request_validation() {
        let req: CreateDeveloperRequest = serde_json::from_value(serde_json::json!({
            "slug": "Bad Slug",
            "name": "",
            "website": "not a url"
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("slug"));
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("website"));
    }
}
