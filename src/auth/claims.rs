use serde::{Deserialize, Serialize};

/// JWT claims issued by Supabase Auth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    pub aud: String,

    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    #[serde(default)]
    pub email: Option<String>,

    /// Supabase's Postgres role (`authenticated`, `anon`), not the platform role
    #[serde(default)]
    pub role: Option<String>,

    /// Free-form user metadata set at sign-up
    #[serde(default)]
    pub user_metadata: Option<serde_json::Value>,
}
