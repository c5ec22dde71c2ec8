pub mod amenities;
pub mod buildings;
pub mod catalog;
pub mod developers;
pub mod field_mappings;
pub mod health;
pub mod images;
pub mod imports;
pub mod layouts;
pub mod locations;
pub mod me;
pub mod media;
pub mod pricing;
pub mod projects;
pub mod units;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/me", get(me::get_me))
        .merge(public_router())
        .merge(admin_router())
}

/// Unauthenticated read-only catalog
fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/images", get(images::get_image))
        .route("/public/projects", get(catalog::list_projects))
        .route("/public/projects/:slug", get(catalog::get_project))
        .route("/public/projects/:slug/units", get(catalog::list_units))
        .route("/public/developers", get(developers::list_public_developers))
        .route("/public/developers/:slug", get(developers::get_public_developer))
        .route("/public/amenities", get(amenities::list_public_amenities))
}

/// Staff-only management API
fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // Developers
        .route(
            "/admin/developers",
            post(developers::create_developer).get(developers::list_developers),
        )
        .route(
            "/admin/developers/:id",
            get(developers::get_developer)
                .put(developers::update_developer)
                .delete(developers::delete_developer),
        )
        .route(
            "/admin/developers/:id/translations/:locale",
            put(developers::upsert_translation),
        )
        // Locations
        .route(
            "/admin/locations",
            post(locations::create_location).get(locations::list_locations),
        )
        .route(
            "/admin/locations/:id",
            get(locations::get_location)
                .put(locations::update_location)
                .delete(locations::delete_location),
        )
        // Amenities
        .route(
            "/admin/amenities",
            post(amenities::create_amenity).get(amenities::list_amenities),
        )
        .route(
            "/admin/amenities/:id",
            get(amenities::get_amenity)
                .put(amenities::update_amenity)
                .delete(amenities::delete_amenity),
        )
        .route(
            "/admin/amenities/:id/translations/:locale",
            put(amenities::upsert_translation),
        )
        // Projects
        .route(
            "/admin/projects",
            post(projects::create_project).get(projects::list_projects),
        )
        .route(
            "/admin/projects/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/admin/projects/:id/publish", patch(projects::set_published))
        .route("/admin/projects/:id/amenities", put(amenities::set_project_amenities))
        .route(
            "/admin/projects/:id/translations/auto",
            post(projects::auto_translate),
        )
        .route(
            "/admin/projects/:id/translations/:locale",
            put(projects::upsert_translation).delete(projects::delete_translation),
        )
        // Buildings
        .route(
            "/admin/projects/:id/buildings",
            post(buildings::create_building).get(buildings::list_buildings),
        )
        .route(
            "/admin/buildings/:id",
            get(buildings::get_building)
                .put(buildings::update_building)
                .delete(buildings::delete_building),
        )
        // Layouts
        .route(
            "/admin/projects/:id/layouts",
            post(layouts::create_layout).get(layouts::list_layouts),
        )
        .route(
            "/admin/layouts/:id",
            get(layouts::get_layout)
                .put(layouts::update_layout)
                .delete(layouts::delete_layout),
        )
        .route(
            "/admin/layouts/:id/translations/:locale",
            put(layouts::upsert_translation).delete(layouts::delete_translation),
        )
        .route("/admin/layouts/:id/apply", post(layouts::apply_layout))
        // Units and pricing
        .route(
            "/admin/projects/:id/units",
            post(units::create_unit).get(units::list_units),
        )
        .route(
            "/admin/units/:id",
            get(units::get_unit)
                .put(units::update_unit)
                .delete(units::delete_unit),
        )
        .route("/admin/units/:id/status", patch(units::set_status))
        .route("/admin/units/:id/price-history", get(units::price_history))
        .route(
            "/admin/projects/:id/pricing/adjust",
            post(pricing::adjust_prices),
        )
        // Media
        .route(
            "/admin/projects/:id/media",
            post(media::upload_media).get(media::list_media),
        )
        .route("/admin/projects/:id/media/link", post(media::link_media))
        .route("/admin/projects/:id/media/order", put(media::reorder_media))
        .route(
            "/admin/media/:id",
            put(media::update_media).delete(media::delete_media),
        )
        // Imports
        .route(
            "/admin/field-mappings",
            post(field_mappings::create_field_mapping).get(field_mappings::list_field_mappings),
        )
        .route(
            "/admin/field-mappings/:id",
            get(field_mappings::get_field_mapping)
                .put(field_mappings::update_field_mapping)
                .delete(field_mappings::delete_field_mapping),
        )
        .route(
            "/admin/projects/:id/imports",
            post(imports::import_units).get(imports::list_imports),
        )
        .route("/admin/projects/:id/imports/upload", post(imports::upload_import))
        .route("/admin/projects/:id/imports/preview", post(imports::preview_import))
        .route("/admin/imports/:id", get(imports::get_import))
}
