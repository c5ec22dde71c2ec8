//! Location domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub id: Uuid,
    pub country: String,
    pub city: String,
    pub district: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Single-line address used for geocoding
    pub fn geocode_query(country: &str, city: &str, district: Option<&str>, address: Option<&str>) -> String {
        [address, district, Some(city), Some(country)]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLocationRequest {
    #[validate(length(min = 2, max = 100))]
    pub country: String,
    #[validate(length(min = 1, max = 120))]
    pub city: String,
    #[validate(length(max = 120))]
    #[serde(default)]
    pub district: Option<String>,
    #[validate(length(max = 300))]
    #[serde(default)]
    pub address: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    #[serde(default)]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Skip the geocoder even when coordinates are missing
    #[serde(default)]
    pub skip_geocoding: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateLocationRequest {
    #[validate(length(min = 2, max = 100))]
    #[serde(default)]
    pub country: Option<String>,
    #[validate(length(min = 1, max = 120))]
    #[serde(default)]
    pub city: Option<String>,
    #[validate(length(max = 120))]
    #[serde(default)]
    pub district: Option<String>,
    #[validate(length(max = 300))]
    #[serde(default)]
    pub address: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    #[serde(default)]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Location filter for admin listing
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LocationQuery {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geocode_query_skips_missing_parts() {
        assert_eq!(
            Location::geocode_query("Cyprus", "Limassol", None, Some(" 12 Makariou Ave ")),
            "12 Makariou Ave, Limassol, Cyprus"
        );
        assert_eq!(
            Location::geocode_query("Cyprus", "Limassol", Some(""), None),
            "Limassol, Cyprus"
        );
    }

    #[test]
    fn coordinates_are_range_checked() {
        let req: CreateLocationRequest = serde_json::from_value(serde_json::json!({
            "country": "Cyprus",
            "city": "Limassol",
            "latitude": 95.0
        }))
        .unwrap();
        assert!(req.validate().unwrap_err().field_errors().contains_key("latitude"));
    }
}
