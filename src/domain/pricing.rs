//! Bulk price adjustments and price history

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::text_enum;
use super::units::UnitStatus;

text_enum! {
    /// How `value` is applied to each unit's price
    AdjustmentMode {
        Percent => "percent",
        Amount => "amount",
        Set => "set",
    } default Percent
}

text_enum! {
    /// What caused a row in `unit_price_history`
    PriceChangeSource {
        Manual => "manual",
        Import => "import",
        BulkAdjustment => "bulk_adjustment",
    } default Manual
}

fn validate_round_to(step: &Decimal) -> Result<(), ValidationError> {
    if *step > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("round_to");
        err.message = Some("must be greater than zero".into());
        Err(err)
    }
}

/// `POST /admin/projects/:id/pricing/adjust` body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PriceAdjustmentRequest {
    pub mode: AdjustmentMode,
    /// Percent (`5` = +5%), absolute delta, or the new price for `set`
    pub value: Decimal,
    #[serde(default)]
    pub building_id: Option<Uuid>,
    #[serde(default)]
    pub layout_id: Option<Uuid>,
    /// Statuses to touch; empty means available units only
    #[serde(default)]
    pub statuses: Vec<UnitStatus>,
    /// Round results to the nearest multiple, e.g. `1000`
    #[validate(custom(function = "validate_round_to"))]
    #[serde(default)]
    pub round_to: Option<Decimal>,
    /// Compute the result without writing
    #[serde(default)]
    pub dry_run: bool,
}

impl PriceAdjustmentRequest {
    pub fn effective_statuses(&self) -> Vec<&'static str> {
        if self.statuses.is_empty() {
            vec![UnitStatus::Available.as_str()]
        } else {
            self.statuses.iter().map(|s| s.as_str()).collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("adjusted price {result} is negative")]
    Negative { result: Decimal },
    #[error("adjusted price is out of range")]
    Overflow,
}

/// Apply one adjustment to a price, rounding to cents (and `round_to` when set)
pub fn adjust_price(
    current: Decimal,
    mode: AdjustmentMode,
    value: Decimal,
    round_to: Option<Decimal>,
) -> Result<Decimal, PriceError> {
    let raw = match mode {
        AdjustmentMode::Percent => current
            .checked_mul(value)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .and_then(|delta| current.checked_add(delta)),
        AdjustmentMode::Amount => current.checked_add(value),
        AdjustmentMode::Set => Some(value),
    }
    .ok_or(PriceError::Overflow)?;

    let rounded = match round_to {
        Some(step) if step > Decimal::ZERO => raw
            .checked_div(step)
            .map(|steps| steps.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|steps| steps.checked_mul(step))
            .ok_or(PriceError::Overflow)?,
        _ => raw,
    };
    let result = rounded.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    if result < Decimal::ZERO {
        return Err(PriceError::Negative { result });
    }
    Ok(result.normalize())
}

/// One unit's planned price change
#[derive(Debug, Clone, Serialize)]
pub struct PriceChange {
    pub unit_id: Uuid,
    pub unit_number: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceAdjustmentResponse {
    pub dry_run: bool,
    pub matched_units: usize,
    pub changed_units: usize,
    pub changes: Vec<PriceChange>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PriceHistoryEntry {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub old_price: Option<Decimal>,
    pub new_price: Option<Decimal>,
    pub source: String,
    pub changed_by: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn percent_increase_and_decrease() {
        assert_eq!(
            adjust_price(d("100000"), AdjustmentMode::Percent, d("5"), None).unwrap(),
            d("105000")
        );
        assert_eq!(
            adjust_price(d("99.99"), AdjustmentMode::Percent, d("-10"), None).unwrap(),
            d("89.99")
        );
    }

    #[test]
    fn amount_and_set() {
        assert_eq!(
            adjust_price(d("250000"), AdjustmentMode::Amount, d("-15000"), None).unwrap(),
            d("235000")
        );
        assert_eq!(
            adjust_price(d("1"), AdjustmentMode::Set, d("320000"), None).unwrap(),
            d("320000")
        );
    }

    #[test]
    fn rounds_to_step() {
        assert_eq!(
            adjust_price(d("123456"), AdjustmentMode::Percent, d("3"), Some(d("1000"))).unwrap(),
            d("127000")
        );
        assert_eq!(
            adjust_price(d("1499"), AdjustmentMode::Amount, d("0"), Some(d("1000"))).unwrap(),
            d("1000")
        );
    }

    #[test]
    fn negative_result_is_rejected() {
        let err = adjust_price(d("1000"), AdjustmentMode::Amount, d("-1500"), None).unwrap_err();
        assert_eq!(err, PriceError::Negative { result: d("-500") });
        assert_eq!(err.to_string(), "adjusted price -500 is negative");
        assert!(adjust_price(d("1000"), AdjustmentMode::Percent, d("-100"), None).is_ok());
    }

    #[test]
    fn out_of_range_inputs_are_errors() {
        let huge = d("10000000000000000000000000");
        assert_eq!(
            adjust_price(d("100000"), AdjustmentMode::Percent, huge, None),
            Err(PriceError::Overflow)
        );
        assert_eq!(
            adjust_price(d("100000"), AdjustmentMode::Amount, d("0"), Some(d("0.0000000000000000000000000001"))),
            Err(PriceError::Overflow)
        );
        assert_eq!(
            adjust_price(Decimal::MAX, AdjustmentMode::Amount, d("1"), None),
            Err(PriceError::Overflow)
        );
    }

    #[test]
    fn default_statuses_are_available_only() {
        let req: PriceAdjustmentRequest = serde_json::from_value(serde_json::json!({
            "mode": "percent",
            "value": "2.5"
        }))
        .unwrap();
        assert_eq!(req.effective_statuses(), vec!["available"]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn round_to_must_be_positive() {
        let req: PriceAdjustmentRequest = serde_json::from_value(serde_json::json!({
            "mode": "amount",
            "value": 10,
            "round_to": 0
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }
}
