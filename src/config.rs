use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Image proxy limits and cache policy
#[derive(Debug, Clone)]
pub struct ImageProxySettings {
    pub allowed_hosts: Vec<String>,
    pub max_dimension: u32,
    pub default_quality: u8,
    pub max_source_bytes: usize,
    pub cache_max_age_seconds: u64,
    pub timeout_seconds: u64,
}

/// Optional third-party integrations. `None` disables the feature.
#[derive(Debug, Clone)]
pub struct TranslationApiSettings {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct GeocoderSettings {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Supabase Auth
    pub supabase_jwt_jwks_url: String,
    pub supabase_jwt_issuer: String,
    pub supabase_jwt_audience: String,
    pub jwks_cache_ttl_seconds: u64,

    // Supabase Storage
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub storage_bucket: String,

    // Locales
    pub default_locale: String,
    pub supported_locales: Vec<String>,

    // Image proxy
    pub image_proxy: ImageProxySettings,

    // Imports and uploads
    pub import_transaction_timeout_seconds: u64,
    pub import_max_rows: usize,
    pub upload_max_bytes: usize,

    // Integrations
    pub translation_api: Option<TranslationApiSettings>,
    pub geocoder: Option<GeocoderSettings>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10);

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/0".to_string());
        let redis_cache_ttl_seconds = parse_or("REDIS_CACHE_TTL_SECONDS", 300);

        // CORS
        let cors_allow_origins = split_list(
            &env::var("CORS_ALLOW_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        );

        // Supabase Auth
        let supabase_jwt_jwks_url =
            env::var("SUPABASE_JWT_JWKS_URL").context("SUPABASE_JWT_JWKS_URL must be set")?;
        let supabase_jwt_issuer =
            env::var("SUPABASE_JWT_ISSUER").context("SUPABASE_JWT_ISSUER must be set")?;
        let supabase_jwt_audience =
            env::var("SUPABASE_JWT_AUDIENCE").unwrap_or_else(|_| "authenticated".to_string());
        let jwks_cache_ttl_seconds = parse_or("JWKS_CACHE_TTL_SECONDS", 1800);

        // Supabase Storage
        let supabase_url = env::var("SUPABASE_URL")
            .context("SUPABASE_URL must be set")?
            .trim_end_matches('/')
            .to_string();
        let supabase_service_role_key = env::var("SUPABASE_SERVICE_ROLE_KEY")
            .context("SUPABASE_SERVICE_ROLE_KEY must be set")?;
        let storage_bucket = env::var("STORAGE_BUCKET").unwrap_or_else(|_| "media".to_string());

        // Locales
        let default_locale = env::var("DEFAULT_LOCALE")
            .unwrap_or_else(|_| "en".to_string())
            .to_lowercase();
        let mut supported_locales: Vec<String> =
            split_list(&env::var("SUPPORTED_LOCALES").unwrap_or_else(|_| "en".to_string()))
                .into_iter()
                .map(|l| l.to_lowercase())
                .collect();
        if !supported_locales.contains(&default_locale) {
            supported_locales.insert(0, default_locale.clone());
        }

        // Image proxy
        let image_proxy = ImageProxySettings {
            allowed_hosts: split_list(&env::var("IMAGE_PROXY_ALLOWED_HOSTS").unwrap_or_default())
                .into_iter()
                .map(|h| h.to_lowercase())
                .collect(),
            max_dimension: parse_or("IMAGE_PROXY_MAX_DIMENSION", 3840),
            default_quality: parse_or("IMAGE_PROXY_DEFAULT_QUALITY", 75),
            max_source_bytes: parse_or("IMAGE_PROXY_MAX_SOURCE_BYTES", 20 * 1024 * 1024),
            cache_max_age_seconds: parse_or("IMAGE_PROXY_CACHE_MAX_AGE_SECONDS", 31_536_000),
            timeout_seconds: parse_or("IMAGE_PROXY_TIMEOUT_SECONDS", 15),
        };

        // Imports and uploads
        let import_transaction_timeout_seconds = parse_or("IMPORT_TRANSACTION_TIMEOUT_SECONDS", 30);
        let import_max_rows = parse_or("IMPORT_MAX_ROWS", 5000);
        let upload_max_bytes = parse_or("UPLOAD_MAX_BYTES", 25 * 1024 * 1024);

        // Integrations
        let translation_api = match (env::var("TRANSLATION_API_URL"), env::var("TRANSLATION_API_KEY")) {
            (Ok(url), Ok(api_key)) if !url.is_empty() && !api_key.is_empty() => {
                Some(TranslationApiSettings {
                    url: url.trim_end_matches('/').to_string(),
                    api_key,
                })
            }
            _ => None,
        };

        let geocoder = env::var("MAPS_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(|api_key| GeocoderSettings {
                url: env::var("MAPS_GEOCODE_URL").unwrap_or_else(|_| {
                    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
                }),
                api_key,
            });

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            supabase_jwt_jwks_url,
            supabase_jwt_issuer,
            supabase_jwt_audience,
            jwks_cache_ttl_seconds,
            supabase_url,
            supabase_service_role_key,
            storage_bucket,
            default_locale,
            supported_locales,
            image_proxy,
            import_transaction_timeout_seconds,
            import_max_rows,
            upload_max_bytes,
            translation_api,
            geocoder,
        })
    }

    /// Public base URL of the storage bucket, without a trailing slash
    pub fn storage_public_base(&self) -> String {
        format!(
            "{}/storage/v1/object/public/{}",
            self.supabase_url, self.storage_bucket
        )
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_dev() {
        assert_eq!(Environment::from_str("production"), Environment::Prod);
        assert_eq!(Environment::from_str("STAGING"), Environment::Staging);
        assert_eq!(Environment::from_str("whatever"), Environment::Dev);
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list(" a.com, ,b.com ,"),
            vec!["a.com".to_string(), "b.com".to_string()]
        );
        assert!(split_list("").is_empty());
    }
}
