//! Unit layout (floor-plan template) domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::i18n::{Locale, Localized};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UnitLayout {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<Decimal>,
    pub floor_plan_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LayoutTranslation {
    #[serde(skip_serializing)]
    pub layout_id: Uuid,
    pub locale: String,
    pub name: String,
    pub description: Option<String>,
}

impl Localized for LayoutTranslation {
    fn locale(&self) -> &str {
        &self.locale
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LayoutTranslationInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 5000))]
    #[serde(default)]
    pub description: Option<String>,
}

/// `name` is the internal key used by imports; display names live in translations
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLayoutRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(range(min = 0, max = 50))]
    #[serde(default)]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    #[serde(default)]
    pub bathrooms: Option<i32>,
    #[serde(default)]
    pub area: Option<Decimal>,
    #[validate(url)]
    #[serde(default)]
    pub floor_plan_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateLayoutRequest {
    #[validate(length(min = 1, max = 120))]
    #[serde(default)]
    pub name: Option<String>,
    #[validate(range(min = 0, max = 50))]
    #[serde(default)]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    #[serde(default)]
    pub bathrooms: Option<i32>,
    #[serde(default)]
    pub area: Option<Decimal>,
    #[validate(url)]
    #[serde(default)]
    pub floor_plan_url: Option<String>,
}

/// Assign a layout to units, copying its room counts and area
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApplyLayoutRequest {
    #[validate(length(min = 1, max = 1000))]
    pub unit_ids: Vec<Uuid>,
    /// Keep the units' own bedrooms/bathrooms/area and only link the layout
    #[serde(default)]
    pub link_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyLayoutResponse {
    pub layout_id: Uuid,
    pub updated_units: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutAdminResponse {
    #[serde(flatten)]
    pub layout: UnitLayout,
    pub translations: Vec<LayoutTranslation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutPublicResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<Decimal>,
    pub floor_plan_url: Option<String>,
    pub available_units: i64,
    pub min_price: Option<Decimal>,
}

impl LayoutPublicResponse {
    pub fn localize(
        layout: &UnitLayout,
        translations: &[LayoutTranslation],
        locale: &Locale,
        available_units: i64,
        min_price: Option<Decimal>,
    ) -> Self {
        let picked = locale.pick(translations);
        Self {
            id: layout.id,
            name: picked
                .map(|t| t.name.clone())
                .unwrap_or_else(|| layout.name.clone()),
            description: picked.and_then(|t| t.description.clone()),
            bedrooms: layout.bedrooms,
            bathrooms: layout.bathrooms,
            area: layout.area,
            floor_plan_url: layout.floor_plan_url.clone(),
            available_units,
            min_price,
        }
    }
}

/// Area must be strictly positive when present
pub fn check_area(area: Option<Decimal>) -> Result<(), &'static str> {
    match area {
        Some(a) if a <= Decimal::ZERO => Err("area must be greater than zero"),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn area_must_be_positive() {
        assert!(check_area(None).is_ok());
        assert!(check_area(Some(Decimal::from_str("54.5").unwrap())).is_ok());
        assert!(check_area(Some(Decimal::ZERO)).is_err());
    }

    #[test]
    fn layout_name_falls_back_to_internal_name() {
        let layout = UnitLayout {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "2BR-A".into(),
            bedrooms: Some(2),
            bathrooms: Some(1),
            area: None,
            floor_plan_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let view = LayoutPublicResponse::localize(
            &layout,
            &[],
            &Locale {
                tag: "en".into(),
                default: "en".into(),
            },
            3,
            None,
        );
        assert_eq!(view.name, "2BR-A");
        assert_eq!(view.available_units, 3);
    }
}
