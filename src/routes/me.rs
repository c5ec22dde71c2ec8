use axum::{extract::State, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// `admin`, `agent` or `viewer`; `None` when no profile exists yet
    pub role: Option<String>,
    /// Developer an agent acts for
    pub developer_id: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    role: String,
    developer_id: Option<Uuid>,
}

/// GET /me
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let profile: Option<ProfileRow> =
        sqlx::query_as("SELECT role, developer_id FROM profiles WHERE id = $1")
            .bind(auth.user_id)
            .fetch_optional(&state.db)
            .await?;

    Ok(DataResponse::new(MeResponse {
        user_id: auth.user_id,
        email: auth.email.clone(),
        display_name: auth.display_name(),
        role: profile.as_ref().map(|p| p.role.clone()),
        developer_id: profile.and_then(|p| p.developer_id),
    }))
}
