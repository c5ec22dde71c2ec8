use super::Claims;
use uuid::Uuid;

/// Authenticated user extracted from a verified JWT
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: Option<String>,
    claims: Claims,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Result<Self, &'static str> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token")?;

        Ok(Self {
            user_id,
            email: claims.email.clone(),
            claims: claims.clone(),
        })
    }

    /// Display name from Supabase user metadata, if present
    pub fn display_name(&self) -> Option<String> {
        self.claims
            .user_metadata
            .as_ref()
            .and_then(|m| m.get("full_name").or_else(|| m.get("name")))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, metadata: Option<serde_json::Value>) -> Claims {
        Claims {
            sub: sub.to_string(),
            aud: "authenticated".into(),
            iss: "https://example.supabase.co/auth/v1".into(),
            iat: 0,
            exp: 0,
            email: Some("agent@example.com".into()),
            role: Some("authenticated".into()),
            user_metadata: metadata,
        }
    }

    #[test]
    fn rejects_non_uuid_subject() {
        assert!(AuthContext::from_claims(&claims("not-a-uuid", None)).is_err());
    }

    #[test]
    fn reads_display_name_from_metadata() {
        let id = Uuid::new_v4();
        let ctx = AuthContext::from_claims(&claims(
            &id.to_string(),
            Some(serde_json::json!({ "full_name": "Dana Agent" })),
        ))
        .unwrap();
        assert_eq!(ctx.user_id, id);
        assert_eq!(ctx.display_name().as_deref(), Some("Dana Agent"));
    }
}
