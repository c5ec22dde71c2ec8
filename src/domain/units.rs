//! Unit (sellable apartment/villa) domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{parse_text, text_enum, validate_currency};

text_enum! {
    /// Sales status of a unit
    UnitStatus {
        Available => "available",
        Reserved => "reserved",
        Sold => "sold",
        Unavailable => "unavailable",
    } default Available
}

impl UnitStatus {
    /// Lenient parser for spreadsheet values (`Booked`, `for sale`, ...)
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "available" | "free" | "for_sale" | "on_sale" | "open" => Some(Self::Available),
            "reserved" | "booked" | "hold" | "on_hold" => Some(Self::Reserved),
            "sold" | "sold_out" | "closed" => Some(Self::Sold),
            "unavailable" | "not_available" | "withdrawn" | "off_market" => {
                Some(Self::Unavailable)
            }
            _ => None,
        }
    }

    /// Visible on the public site
    pub fn is_public(self) -> bool {
        self != Self::Unavailable
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UnitRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub building_id: Option<Uuid>,
    pub layout_id: Option<Uuid>,
    pub unit_number: String,
    pub floor: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<Decimal>,
    pub price: Option<Decimal>,
    pub currency: String,
    pub status: String,
    pub view: Option<String>,
    pub orientation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Unit {
    pub id: Uuid,
    pub project_id: Uuid,
    pub building_id: Option<Uuid>,
    pub layout_id: Option<Uuid>,
    pub unit_number: String,
    pub floor: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<Decimal>,
    pub price: Option<Decimal>,
    pub currency: String,
    pub status: UnitStatus,
    pub view: Option<String>,
    pub orientation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UnitRow> for Unit {
    fn from(r: UnitRow) -> Self {
        Self {
            id: r.id,
            project_id: r.project_id,
            building_id: r.building_id,
            layout_id: r.layout_id,
            unit_number: r.unit_number,
            floor: r.floor,
            bedrooms: r.bedrooms,
            bathrooms: r.bathrooms,
            area: r.area,
            price: r.price,
            currency: r.currency,
            status: parse_text(&r.status),
            view: r.view,
            orientation: r.orientation,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUnitRequest {
    #[validate(length(min = 1, max = 50))]
    pub unit_number: String,
    #[serde(default)]
    pub building_id: Option<Uuid>,
    #[serde(default)]
    pub layout_id: Option<Uuid>,
    #[validate(range(min = -10, max = 300))]
    #[serde(default)]
    pub floor: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    #[serde(default)]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    #[serde(default)]
    pub bathrooms: Option<i32>,
    #[serde(default)]
    pub area: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Defaults to the project currency
    #[validate(custom(function = "validate_currency"))]
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: UnitStatus,
    #[validate(length(max = 120))]
    #[serde(default)]
    pub view: Option<String>,
    #[validate(length(max = 60))]
    #[serde(default)]
    pub orientation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateUnitRequest {
    #[validate(length(min = 1, max = 50))]
    #[serde(default)]
    pub unit_number: Option<String>,
    #[serde(default)]
    pub building_id: Option<Uuid>,
    #[serde(default)]
    pub layout_id: Option<Uuid>,
    #[validate(range(min = -10, max = 300))]
    #[serde(default)]
    pub floor: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    #[serde(default)]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    #[serde(default)]
    pub bathrooms: Option<i32>,
    #[serde(default)]
    pub area: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[validate(custom(function = "validate_currency"))]
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<UnitStatus>,
    #[validate(length(max = 120))]
    #[serde(default)]
    pub view: Option<String>,
    #[validate(length(max = 60))]
    #[serde(default)]
    pub orientation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitStatusUpdate {
    pub status: UnitStatus,
}

/// Admin unit listing filters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UnitQuery {
    #[serde(default)]
    pub building_id: Option<Uuid>,
    #[serde(default)]
    pub layout_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<UnitStatus>,
    #[serde(default)]
    pub min_floor: Option<i32>,
    #[serde(default)]
    pub max_floor: Option<i32>,
    #[serde(default)]
    pub bedrooms: Option<i32>,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
}

/// Public units listing filters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PublicUnitQuery {
    #[serde(default)]
    pub building_id: Option<Uuid>,
    #[serde(default)]
    pub layout_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<UnitStatus>,
    #[serde(default)]
    pub bedrooms: Option<i32>,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
}

/// Unit as shown on the public site
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PublicUnit {
    pub id: Uuid,
    pub unit_number: String,
    pub building_name: Option<String>,
    pub layout_id: Option<Uuid>,
    pub floor: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<Decimal>,
    pub price: Option<Decimal>,
    pub currency: String,
    pub status: String,
    pub view: Option<String>,
    pub orientation: Option<String>,
}

/// Amounts stored in NUMERIC(14,2) / NUMERIC(12,2) columns
pub fn check_amounts(area: Option<Decimal>, price: Option<Decimal>) -> Result<(), String> {
    if let Some(a) = area {
        if a <= Decimal::ZERO {
            return Err("area must be greater than zero".into());
        }
    }
    if let Some(p) = price {
        if p < Decimal::ZERO {
            return Err("price must not be negative".into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_status_aliases() {
        assert_eq!(UnitStatus::parse_loose(" Booked "), Some(UnitStatus::Reserved));
        assert_eq!(UnitStatus::parse_loose("For Sale"), Some(UnitStatus::Available));
        assert_eq!(UnitStatus::parse_loose("sold-out"), Some(UnitStatus::Sold));
        assert_eq!(UnitStatus::parse_loose("off market"), Some(UnitStatus::Unavailable));
        assert_eq!(UnitStatus::parse_loose("maybe"), None);
    }

    #[test]
    fn unavailable_units_are_hidden() {
        assert!(UnitStatus::Reserved.is_public());
        assert!(!UnitStatus::Unavailable.is_public());
    }

    #[test]
    fn amounts_are_checked() {
        assert!(check_amounts(None, Some(Decimal::ZERO)).is_ok());
        assert!(check_amounts(Some(Decimal::ZERO), None).is_err());
        assert!(check_amounts(None, Some(Decimal::NEGATIVE_ONE)).is_err());
    }

    #[test]
    fn create_request_defaults_to_available() {
        let req: CreateUnitRequest =
            serde_json::from_value(serde_json::json!({ "unit_number": "A-101" })).unwrap();
        assert_eq!(req.status, UnitStatus::Available);
        assert!(req.validate().is_ok());
    }
}
