//! Redis read-through cache for public pages.
//!
//! Public project and developer pages are cached per locale as JSON with a
//! TTL; admin writes drop the whole `public:` namespace. Callers treat every
//! cache failure as a miss.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Redis cache client with connection pooling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    default_ttl: Duration,
}

impl RedisCache {
    /// Create a new Redis cache connection.
    pub async fn new(redis_url: &str, default_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Redis cache connected");

        Ok(Self {
            conn,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        })
    }

    /// Get a value from cache.
    #[instrument(skip(self), fields(cache_hit))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => {
                match serde_json::from_str(&data) {
                    Ok(value) => {
                        debug!(key = key, "Cache hit");
                        tracing::Span::current().record("cache_hit", true);
                        Some(value)
                    }
                    Err(e) => {
                        warn!(key = key, error = %e, "Failed to deserialize cached value");
                        tracing::Span::current().record("cache_hit", false);
                        None
                    }
                }
            }
            Ok(None) => {
                debug!(key = key, "Cache miss");
                tracing::Span::current().record("cache_hit", false);
                None
            }
            Err(e) => {
                error!(key = key, error = %e, "Redis get error");
                tracing::Span::current().record("cache_hit", false);
                None
            }
        }
    }

    /// Set a value in cache with default TTL.
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    /// Set a value in cache with custom TTL.
    #[instrument(skip(self, value))]
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn.clone();

        let data = serde_json::to_string(value)
            .context("Failed to serialize value for cache")?;

        conn.set_ex::<_, _, ()>(key, data, ttl.as_secs())
            .await
            .context("Failed to set cache value")?;

        debug!(key = key, ttl_secs = ttl.as_secs(), "Cached value");
        Ok(())
    }

    /// Delete all keys matching a pattern (e.g., "public:project:*").
    #[instrument(skip(self))]
    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();

        // SCAN in batches until the cursor wraps (production-safe)
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await
                .context("Failed to scan cache keys")?;

            if !keys.is_empty() {
                let n: i32 = conn.del(&keys).await.context("Failed to delete cache keys")?;
                deleted += n.max(0) as usize;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = pattern, deleted = deleted, "Cache pattern delete");
        Ok(deleted)
    }

    /// Drop cached public pages after a content change. Failures are only logged.
    pub async fn invalidate_public(&self) {
        if let Err(e) = self.delete_pattern(keys::PUBLIC_PATTERN).await {
            warn!(error = %e, "Failed to invalidate public cache");
        }
    }

    /// Check if Redis is healthy.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

/// Cache key builders. Public read models are cached per locale under `public:`.
pub mod keys {
    /// Localized public project page
    pub fn public_project(slug: &str, locale: &str) -> String {
        format!("public:project:{}:{}", slug, locale)
    }

    /// Localized public developer page
    pub fn public_developer(slug: &str, locale: &str) -> String {
        format!("public:developer:{}:{}", slug, locale)
    }

    /// Everything derived from published content
    pub const PUBLIC_PATTERN: &str = "public:*";

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn public_keys_share_the_invalidation_prefix() {
            let prefix = PUBLIC_PATTERN.trim_end_matches('*');
            assert!(public_project("sea-view", "en").starts_with(prefix));
            assert_eq!(public_developer("acme", "de"), "public:developer:acme:de");
        }
    }
}
