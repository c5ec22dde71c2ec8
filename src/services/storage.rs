//! Supabase Storage client (object upload/delete with the service role key)

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, error, instrument};

use crate::config::Settings;
use crate::error::ApiError;

#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl StorageClient {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            base_url: settings.supabase_url.trim_end_matches('/').to_string(),
            bucket: settings.storage_bucket.clone(),
            service_key: settings.supabase_service_role_key.clone(),
        }
    }

    /// Public URL of an object in the bucket
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    /// Upload bytes to `path`. Existing objects are not overwritten.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(&self, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Storage upload request failed");
                ApiError::BadGateway("Object storage unavailable".into())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, path = path, "Storage upload rejected");
            return Err(ApiError::BadGateway(format!("Object storage rejected the upload ({status})")));
        }

        debug!(path = path, "Uploaded object");
        Ok(self.public_url(path))
    }

    /// Remove an object; a missing object is not an error
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);

        self.client
            .delete(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({ "prefixes": [path] }))
            .send()
            .await
            .context("Storage delete request failed")?
            .error_for_status()
            .context("Storage delete rejected")?;

        debug!(path = path, "Deleted object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> StorageClient {
        StorageClient {
            client: Client::new(),
            base_url: "https://abc.supabase.co".into(),
            bucket: "media".into(),
            service_key: "key".into(),
        }
    }

    #[test]
    fn public_urls_are_bucket_scoped() {
        let storage = client();
        let url = storage.public_url("projects/p1/photo.jpg");
        assert_eq!(
            url,
            "https://abc.supabase.co/storage/v1/object/public/media/projects/p1/photo.jpg"
        );
    }
}
