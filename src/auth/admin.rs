//! Admin panel access control
//!
//! Staff users are Supabase users whose `profiles.role` is `admin` or `agent`.
//! Agents act on behalf of one developer (`profiles.developer_id`) and may only
//! touch that developer's projects; admins are unrestricted.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::{AuthError, RequireAuth};
use crate::app::AppState;
use crate::error::{ApiError, ErrorResponse};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Admin,
    Agent,
}

/// Extractor that requires a staff profile
#[derive(Debug, Clone)]
pub struct RequireAdmin {
    pub auth: RequireAuth,
    pub role: StaffRole,
    pub developer_id: Option<Uuid>,
}

#[derive(Debug)]
pub enum AdminAuthError {
    NotAuthenticated(AuthError),
    NotStaff,
    Database(sqlx::Error),
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AdminAuthError::NotAuthenticated(err) => return err.into_response(),
            AdminAuthError::NotStaff => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Admin panel access required",
            ),
            AdminAuthError::Database(err) => {
                tracing::error!(error = ?err, "Failed to load staff profile");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred",
                )
            }
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

#[derive(sqlx::FromRow)]
struct StaffRow {
    role: String,
    developer_id: Option<Uuid>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth = RequireAuth::from_request_parts(parts, state)
            .await
            .map_err(AdminAuthError::NotAuthenticated)?;

        let row: Option<StaffRow> =
            sqlx::query_as("SELECT role, developer_id FROM profiles WHERE id = $1")
                .bind(auth.user_id)
                .fetch_optional(&state.db)
                .await
                .map_err(AdminAuthError::Database)?;

        let (role, developer_id) = match row {
            Some(r) if r.role == "admin" => (StaffRole::Admin, r.developer_id),
            Some(r) if r.role == "agent" => (StaffRole::Agent, r.developer_id),
            _ => {
                tracing::warn!(user_id = %auth.user_id, "Non-staff user attempted to access admin route");
                return Err(AdminAuthError::NotStaff);
            }
        };

        Ok(RequireAdmin {
            auth,
            role,
            developer_id,
        })
    }
}

impl RequireAdmin {
    pub fn user_id(&self) -> Uuid {
        self.auth.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.role == StaffRole::Admin
    }

    /// Whether this staff member may manage content owned by `developer_id`
    pub fn can_manage_developer(&self, developer_id: Uuid) -> bool {
        match self.role {
            StaffRole::Admin => true,
            StaffRole::Agent => self.developer_id == Some(developer_id),
        }
    }

    pub fn ensure_developer(&self, developer_id: Uuid) -> Result<(), ApiError> {
        if self.can_manage_developer(developer_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "You can only manage projects of your own developer",
            ))
        }
    }

    /// Only admins may manage shared catalogs (developers, amenities)
    pub fn ensure_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin privileges required"))
        }
    }

    /// Load a project's owner and check access. Missing projects are 404.
    pub async fn authorize_project(&self, db: &PgPool, project_id: Uuid) -> Result<(), ApiError> {
        let developer_id: Uuid =
            sqlx::query_scalar("SELECT developer_id FROM projects WHERE id = $1")
                .bind(project_id)
                .fetch_optional(db)
                .await?
                .ok_or_else(|| ApiError::not_found("Project not found"))?;

        self.ensure_developer(developer_id)
    }

    /// Resolve the project owning a child row (`buildings`, `units`, ...) and
    /// authorize it. Returns the project id.
    pub async fn authorize_child(
        &self,
        db: &PgPool,
        table: ChildTable,
        id: Uuid,
    ) -> Result<Uuid, ApiError> {
        let sql = format!(
            "SELECT c.project_id, p.developer_id FROM {} c JOIN projects p ON p.id = c.project_id WHERE c.id = $1",
            table.as_str()
        );
        let (project_id, developer_id): (Uuid, Uuid) = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("{} not found", table.label())))?;

        self.ensure_developer(developer_id)?;
        Ok(project_id)
    }

    /// Scope filter for list queries: agents only see their developer
    pub fn developer_scope(&self) -> Option<Uuid> {
        match self.role {
            StaffRole::Admin => None,
            StaffRole::Agent => Some(self.developer_id.unwrap_or_else(Uuid::nil)),
        }
    }
}

/// Tables whose rows hang off a project
#[derive(Debug, Clone, Copy)]
pub enum ChildTable {
    Buildings,
    Units,
    UnitLayouts,
    Media,
    UnitImports,
}

impl ChildTable {
    fn as_str(self) -> &'static str {
        match self {
            Self::Buildings => "buildings",
            Self::Units => "units",
            Self::UnitLayouts => "unit_layouts",
            Self::Media => "media",
            Self::UnitImports => "unit_imports",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Buildings => "Building",
            Self::Units => "Unit",
            Self::UnitLayouts => "Layout",
            Self::Media => "Media",
            Self::UnitImports => "Import",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthContext, Claims};

    fn staff(role: StaffRole, developer_id: Option<Uuid>) -> RequireAdmin {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            aud: "authenticated".into(),
            iss: "issuer".into(),
            iat: 0,
            exp: 0,
            email: None,
            role: None,
            user_metadata: None,
        };
        RequireAdmin {
            auth: RequireAuth(AuthContext::from_claims(&claims).unwrap()),
            role,
            developer_id,
        }
    }

    #[test]
    fn admins_manage_everything() {
        let admin = staff(StaffRole::Admin, None);
        assert!(admin.can_manage_developer(Uuid::new_v4()));
        assert!(admin.ensure_admin().is_ok());
        assert_eq!(admin.developer_scope(), None);
    }

    #[test]
    fn agents_are_scoped_to_their_developer() {
        let dev = Uuid::new_v4();
        let agent = staff(StaffRole::Agent, Some(dev));
        assert!(agent.can_manage_developer(dev));
        assert!(!agent.can_manage_developer(Uuid::new_v4()));
        assert!(agent.ensure_admin().is_err());
        assert_eq!(agent.developer_scope(), Some(dev));
    }

    #[test]
    fn unassigned_agents_see_nothing() {
        let agent = staff(StaffRole::Agent, None);
        assert!(!agent.can_manage_developer(Uuid::new_v4()));
        assert_eq!(agent.developer_scope(), Some(Uuid::nil()));
    }
}
