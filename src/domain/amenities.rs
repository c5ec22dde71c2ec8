//! Amenity catalog types (pool, gym, parking, ...)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::i18n::{Locale, Localized};
use super::validate_slug;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Amenity {
    pub id: Uuid,
    pub slug: String,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AmenityTranslation {
    #[serde(skip_serializing)]
    pub amenity_id: Uuid,
    pub locale: String,
    pub name: String,
}

impl Localized for AmenityTranslation {
    fn locale(&self) -> &str {
        &self.locale
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAmenityRequest {
    #[validate(custom(function = "validate_slug"))]
    pub slug: String,
    #[validate(length(max = 80))]
    #[serde(default)]
    pub icon: Option<String>,
    /// Name in the default locale
    #[validate(length(min = 1, max = 120))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateAmenityRequest {
    #[validate(custom(function = "validate_slug"))]
    #[serde(default)]
    pub slug: Option<String>,
    #[validate(length(max = 80))]
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AmenityTranslationInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
}

/// Replace a project's amenity set
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetProjectAmenitiesRequest {
    #[validate(length(max = 200))]
    pub amenity_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AmenityAdminResponse {
    #[serde(flatten)]
    pub amenity: Amenity,
    pub translations: Vec<AmenityTranslation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmenityPublicResponse {
    pub slug: String,
    pub icon: Option<String>,
    pub name: String,
}

impl AmenityPublicResponse {
    pub fn localize(amenity: &Amenity, translations: &[AmenityTranslation], locale: &Locale) -> Self {
        Self {
            slug: amenity.slug.clone(),
            icon: amenity.icon.clone(),
            name: locale
                .pick(translations)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| amenity.slug.replace('-', " ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untranslated_amenity_uses_humanized_slug() {
        let amenity = Amenity {
            id: Uuid::new_v4(),
            slug: "swimming-pool".into(),
            icon: Some("pool".into()),
            created_at: Utc::now(),
        };
        let locale = Locale {
            tag: "en".into(),
            default: "en".into(),
        };
        let view = AmenityPublicResponse::localize(&amenity, &[], &locale);
        assert_eq!(view.name, "swimming pool");
    }
}
