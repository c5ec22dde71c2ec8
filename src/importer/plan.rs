//! Reconciliation: decide what happens to each validated row

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::validate::UnitDraft;

/// A unit already stored for the project, keyed by lowercased unit number
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingUnit {
    pub id: Uuid,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
    Create,
    Update,
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRow<'a> {
    pub draft: &'a UnitDraft,
    pub action: ImportAction,
    /// Set for updates and skips
    pub existing: Option<&'a ExistingUnit>,
}

impl PlannedRow<'_> {
    /// The price moves and a history row should be written
    pub fn price_change(&self) -> Option<(Option<Decimal>, Decimal)> {
        let new_price = self.draft.price?;
        match (self.action, self.existing) {
            (ImportAction::Create, _) => Some((None, new_price)),
            (ImportAction::Update, Some(existing)) if existing.price != Some(new_price) => {
                Some((existing.price, new_price))
            }
            _ => None,
        }
    }
}

/// Existing units are updated when `update_existing`, otherwise skipped;
/// everything else is created.
pub fn plan<'a>(
    drafts: impl IntoIterator<Item = &'a UnitDraft>,
    existing: &'a HashMap<String, ExistingUnit>,
    update_existing: bool,
) -> Vec<PlannedRow<'a>> {
    drafts
        .into_iter()
        .map(|draft| match existing.get(&draft.key()) {
            Some(unit) => PlannedRow {
                draft,
                action: if update_existing {
                    ImportAction::Update
                } else {
                    ImportAction::Skip
                },
                existing: Some(unit),
            },
            None => PlannedRow {
                draft,
                action: ImportAction::Create,
                existing: None,
            },
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCounts {
    pub create: usize,
    pub update: usize,
    pub skip: usize,
}

/// Tallies reported in the import summary
pub fn count(planned: &[PlannedRow<'_>]) -> PlanCounts {
    planned.iter().fold(PlanCounts::default(), |mut acc, p| {
        match p.action {
            ImportAction::Create => acc.create += 1,
            ImportAction::Update => acc.update += 1,
            ImportAction::Skip => acc.skip += 1,
        }
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(row: usize, number: &str, price: Option<i64>) -> UnitDraft {
        UnitDraft {
            row,
            unit_number: number.into(),
            price: price.map(Decimal::from),
            ..Default::default()
        }
    }

    fn existing(entries: &[(&str, Option<i64>)]) -> HashMap<String, ExistingUnit> {
        entries
            .iter()
            .map(|(n, p)| {
                (
                    n.to_lowercase(),
                    ExistingUnit {
                        id: Uuid::new_v4(),
                        price: p.map(Decimal::from),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn existing_units_update_when_requested() {
        let drafts = vec![draft(1, "A-1", Some(100)), draft(2, "A-2", None)];
        let stored = existing(&[("a-1", Some(90))]);

        let planned = plan(&drafts, &stored, true);
        assert_eq!(planned[0].action, ImportAction::Update);
        assert_eq!(planned[0].existing.map(|e| e.id), Some(stored["a-1"].id));
        assert_eq!(planned[1].action, ImportAction::Create);
        assert_eq!(count(&planned), PlanCounts { create: 1, update: 1, skip: 0 });
    }

    #[test]
    fn existing_units_are_skipped_by_default() {
        let drafts = vec![draft(1, "a-1", Some(100))];
        let stored = existing(&[("A-1", Some(90))]);

        let planned = plan(&drafts, &stored, false);
        assert_eq!(planned[0].action, ImportAction::Skip);
        assert_eq!(planned[0].price_change(), None);
        assert_eq!(count(&planned), PlanCounts { create: 0, update: 0, skip: 1 });
    }

    #[test]
    fn price_history_only_on_real_changes() {
        let drafts = vec![
            draft(1, "A", Some(100)),
            draft(2, "B", Some(90)),
            draft(3, "C", None),
            draft(4, "D", Some(50)),
        ];
        let stored = existing(&[("a", Some(90)), ("b", Some(90)), ("c", Some(10))]);
        let planned = plan(&drafts, &stored, true);

        assert_eq!(
            planned[0].price_change(),
            Some((Some(Decimal::from(90)), Decimal::from(100)))
        );
        assert_eq!(planned[1].price_change(), None);
        assert_eq!(planned[2].price_change(), None);
        assert_eq!(planned[3].price_change(), Some((None, Decimal::from(50))));
    }
}
