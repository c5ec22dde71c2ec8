//! Database side of an import: name lookups, planning against stored units,
//! and the writes. Runs on a connection that is inside a transaction.

use rust_decimal::Decimal;
use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

use super::plan::{self, ExistingUnit, ImportAction};
use super::validate::UnitDraft;
use crate::domain::imports::{ImportOptions, ImportSummary, RowError};
use crate::domain::pricing::PriceChangeSource;
use crate::domain::units::UnitStatus;

/// Project receiving the rows
#[derive(Debug, Clone)]
pub struct ImportTarget {
    pub project_id: Uuid,
    pub currency: String,
    pub user_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Rows failed lookups and invalid rows may not be skipped
    #[error("{} rows reference unknown buildings or layouts", .0.len())]
    Rejected(Vec<RowError>),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct LayoutRef {
    id: Uuid,
    name: String,
    bedrooms: Option<i32>,
    bathrooms: Option<i32>,
    area: Option<Decimal>,
}

/// A draft with its building and layout resolved to ids
struct Resolved<'a> {
    draft: &'a UnitDraft,
    building_id: Option<Uuid>,
    /// Name of a building created by this import
    new_building: Option<String>,
    layout: Option<&'a LayoutRef>,
}

async fn load_buildings(conn: &mut PgConnection, project_id: Uuid) -> Result<HashMap<String, Uuid>, sqlx::Error> {
    let rows: Vec<(Uuid, String)> =
        sqlx::query_as("SELECT id, name FROM buildings WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(|(id, name)| (name.to_lowercase(), id)).collect())
}

async fn load_layouts(conn: &mut PgConnection, project_id: Uuid) -> Result<HashMap<String, LayoutRef>, sqlx::Error> {
    let rows: Vec<LayoutRef> = sqlx::query_as(
        "SELECT id, name, bedrooms, bathrooms, area FROM unit_layouts WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|l| (l.name.to_lowercase(), l)).collect())
}

async fn load_existing(
    conn: &mut PgConnection,
    project_id: Uuid,
    drafts: &[&UnitDraft],
) -> Result<HashMap<String, ExistingUnit>, sqlx::Error> {
    let keys: Vec<String> = drafts.iter().map(|d| d.key()).collect();
    let rows: Vec<(Uuid, String, Option<Decimal>)> = sqlx::query_as(
        r#"
        SELECT id, lower(unit_number), price
        FROM units
        WHERE project_id = $1 AND lower(unit_number) = ANY($2)
        "#,
    )
    .bind(project_id)
    .bind(&keys)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, key, price)| (key, ExistingUnit { id, price }))
        .collect())
}

/// Resolve, plan and write `drafts`, adding the outcome to `summary`.
///
/// Rows whose building or layout cannot be found are counted as failed, or
/// reject the whole batch when `skip_invalid_rows` is off.
pub async fn apply_drafts(
    conn: &mut PgConnection,
    target: &ImportTarget,
    drafts: &[UnitDraft],
    options: &ImportOptions,
    summary: &mut ImportSummary,
) -> Result<(), ApplyError> {
    let buildings = load_buildings(conn, target.project_id).await?;
    let layouts = load_layouts(conn, target.project_id).await?;

    let mut lookup_errors = Vec::new();
    let mut resolved = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let mut ok = true;
        let mut building_id = None;
        let mut new_building = None;

        if let Some(name) = &draft.building {
            match buildings.get(&name.to_lowercase()) {
                Some(id) => building_id = Some(*id),
                None if options.create_missing_buildings => new_building = Some(name.clone()),
                None => {
                    lookup_errors.push(RowError::new(
                        draft.row,
                        "building",
                        format!("building '{name}' does not exist in this project"),
                    ));
                    ok = false;
                }
            }
        }

        let layout = match &draft.layout {
            Some(name) => match layouts.get(&name.to_lowercase()) {
                Some(layout) => Some(layout),
                None => {
                    lookup_errors.push(RowError::new(
                        draft.row,
                        "layout",
                        format!("layout '{name}' does not exist in this project"),
                    ));
                    ok = false;
                    None
                }
            },
            None => None,
        };

        if ok {
            resolved.push(Resolved {
                draft,
                building_id,
                new_building,
                layout,
            });
        } else {
            summary.failed += 1;
        }
    }

    if !lookup_errors.is_empty() && !options.skip_invalid_rows {
        return Err(ApplyError::Rejected(lookup_errors));
    }
    summary.errors.extend(lookup_errors);

    // One building per distinct new name, first spelling wins
    let mut created_buildings: HashMap<String, Uuid> = HashMap::new();
    for item in resolved.iter_mut() {
        let Some(name) = item.new_building.take() else {
            continue;
        };
        let key = name.to_lowercase();
        if let Some(id) = created_buildings.get(&key) {
            item.building_id = Some(*id);
            continue;
        }
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO buildings (id, project_id, name) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(target.project_id)
        .bind(&name)
        .fetch_one(&mut *conn)
        .await?;
        created_buildings.insert(key, id);
        item.building_id = Some(id);
    }
    summary.buildings_created += created_buildings.len();

    let valid: Vec<&UnitDraft> = resolved.iter().map(|r| r.draft).collect();
    let existing = load_existing(conn, target.project_id, &valid).await?;
    let planned = plan::plan(valid.iter().copied(), &existing, options.update_existing);

    let counts = plan::count(&planned);
    summary.created += counts.create;
    summary.updated += counts.update;
    summary.skipped += counts.skip;

    for (item, planned) in resolved.iter().zip(&planned) {
        let draft = item.draft;
        let bedrooms = draft.bedrooms.or(item.layout.and_then(|l| l.bedrooms));
        let bathrooms = draft.bathrooms.or(item.layout.and_then(|l| l.bathrooms));
        let area = draft.area.or(item.layout.and_then(|l| l.area));
        let layout_id = item.layout.map(|l| l.id);
        let status = draft.status.map(|s| s.as_str());

        let unit_id = match (planned.action, planned.existing) {
            (ImportAction::Create, _) => {
                let id = Uuid::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO units (
                        id, project_id, building_id, layout_id, unit_number, floor,
                        bedrooms, bathrooms, area, price, currency, status, view, orientation
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                    "#,
                )
                .bind(id)
                .bind(target.project_id)
                .bind(item.building_id)
                .bind(layout_id)
                .bind(&draft.unit_number)
                .bind(draft.floor)
                .bind(bedrooms)
                .bind(bathrooms)
                .bind(area)
                .bind(draft.price)
                .bind(draft.currency.as_deref().unwrap_or(&target.currency))
                .bind(status.unwrap_or(UnitStatus::Available.as_str()))
                .bind(&draft.view)
                .bind(&draft.orientation)
                .execute(&mut *conn)
                .await?;
                id
            }
            (ImportAction::Update, Some(existing)) => {
                sqlx::query(
                    r#"
                    UPDATE units SET
                        building_id = COALESCE($2, building_id),
                        layout_id = COALESCE($3, layout_id),
                        floor = COALESCE($4, floor),
                        bedrooms = COALESCE($5, bedrooms),
                        bathrooms = COALESCE($6, bathrooms),
                        area = COALESCE($7, area),
                        price = COALESCE($8, price),
                        currency = COALESCE($9, currency),
                        status = COALESCE($10, status),
                        view = COALESCE($11, view),
                        orientation = COALESCE($12, orientation),
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(existing.id)
                .bind(item.building_id)
                .bind(layout_id)
                .bind(draft.floor)
                .bind(bedrooms)
                .bind(bathrooms)
                .bind(area)
                .bind(draft.price)
                .bind(&draft.currency)
                .bind(status)
                .bind(&draft.view)
                .bind(&draft.orientation)
                .execute(&mut *conn)
                .await?;
                existing.id
            }
            _ => continue,
        };

        if let Some((old_price, new_price)) = planned.price_change() {
            sqlx::query(
                r#"
                INSERT INTO unit_price_history (id, unit_id, old_price, new_price, source, changed_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(unit_id)
            .bind(old_price)
            .bind(new_price)
            .bind(PriceChangeSource::Import.as_str())
            .bind(target.user_id)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}
