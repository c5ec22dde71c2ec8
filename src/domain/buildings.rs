//! Building domain types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Building {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub floors: Option<i32>,
    pub completion_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBuildingRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(range(min = 0, max = 300))]
    #[serde(default)]
    pub floors: Option<i32>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateBuildingRequest {
    #[validate(length(min = 1, max = 120))]
    #[serde(default)]
    pub name: Option<String>,
    #[validate(range(min = 0, max = 300))]
    #[serde(default)]
    pub floors: Option<i32>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
}

/// Admin view with unit counts
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BuildingWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub building: Building,
    pub unit_count: i64,
    pub available_units: i64,
}
