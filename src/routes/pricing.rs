//! Bulk price adjustment

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAdmin;
use crate::domain::pricing::{
    adjust_price, PriceAdjustmentRequest, PriceAdjustmentResponse, PriceChange, PriceChangeSource,
};
use crate::error::ApiError;
use crate::routes::units::record_price_change;

#[derive(Debug, sqlx::FromRow)]
struct PricedUnit {
    id: Uuid,
    unit_number: String,
    price: Decimal,
}

/// POST /admin/projects/:id/pricing/adjust
///
/// All-or-nothing: one rejected result (negative or out of range) rejects
/// the whole adjustment.
pub async fn adjust_prices(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    Path(project_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<PriceAdjustmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    admin.authorize_project(&state.db, project_id).await?;

    let statuses = req.effective_statuses();
    let mut tx = state.db.begin().await?;

    let units: Vec<PricedUnit> = sqlx::query_as(
        r#"
        SELECT id, unit_number, price
        FROM units
        WHERE project_id = $1
          AND price IS NOT NULL
          AND status = ANY($2)
          AND ($3::uuid IS NULL OR building_id = $3)
          AND ($4::uuid IS NULL OR layout_id = $4)
        ORDER BY lower(unit_number)
        FOR UPDATE
        "#,
    )
    .bind(project_id)
    .bind(&statuses)
    .bind(req.building_id)
    .bind(req.layout_id)
    .fetch_all(&mut *tx)
    .await?;

    let mut changes = Vec::new();
    let mut rejected = Vec::new();
    for unit in &units {
        match adjust_price(unit.price, req.mode, req.value, req.round_to) {
            Ok(new_price) if new_price != unit.price => changes.push(PriceChange {
                unit_id: unit.id,
                unit_number: unit.unit_number.clone(),
                old_price: unit.price,
                new_price,
            }),
            Ok(_) => {}
            Err(e) => rejected.push(json!({ "unit_number": unit.unit_number, "error": e.to_string() })),
        }
    }

    if !rejected.is_empty() {
        return Err(ApiError::validation_with(
            format!("{} units cannot be adjusted; nothing was changed", rejected.len()),
            json!({ "units": rejected }),
        ));
    }

    if !req.dry_run {
        for change in &changes {
            sqlx::query("UPDATE units SET price = $2, updated_at = NOW() WHERE id = $1")
                .bind(change.unit_id)
                .bind(change.new_price)
                .execute(&mut *tx)
                .await?;
            record_price_change(
                &mut tx,
                change.unit_id,
                Some(change.old_price),
                Some(change.new_price),
                PriceChangeSource::BulkAdjustment,
                admin.user_id(),
            )
            .await?;
        }
        tx.commit().await?;
        state.cache.invalidate_public().await;
    } else {
        tx.rollback().await?;
    }

    tracing::info!(
        user_id = %admin.user_id(),
        project_id = %project_id,
        mode = %req.mode,
        matched = units.len(),
        changed = changes.len(),
        dry_run = req.dry_run,
        "Price adjustment applied"
    );

    Ok(DataResponse::new(PriceAdjustmentResponse {
        dry_run: req.dry_run,
        matched_units: units.len(),
        changed_units: changes.len(),
        changes,
    }))
}
