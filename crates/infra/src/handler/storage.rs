//! Supabase storage REST client for generated images.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use super::HandlerError;
use super::image_generation::ArtifactStore;

#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, HandlerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            bucket: bucket.into(),
        })
    }

    /// Object path for a freshly generated image.
    fn object_path(&self) -> String {
        format!(
            "{}/generated_{}_{}.png",
            self.bucket,
            Utc::now().timestamp_millis(),
            Uuid::now_v7()
        )
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }
}

#[async_trait]
impl ArtifactStore for SupabaseStorage {
    #[instrument(skip(self), fields(bucket = %self.bucket), err)]
    async fn store_from_url(&self, source_url: &str) -> Result<String, HandlerError> {
        let image = self
            .client
            .get(source_url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| HandlerError::Upload(format!("download failed: {e}")))?
            .bytes()
            .await?;

        let path = self.object_path();
        let response = self
            .client
            .post(format!(
                "{}/storage/v1/object/{}/{}",
                self.base_url, self.bucket, path
            ))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(image)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandlerError::Upload(format!("{status}: {body}")));
        }

        Ok(self.public_url(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_public_url_under_bucket() {
        let storage = SupabaseStorage::new(
            "https://proj.supabase.co/",
            "key",
            "wardrobe",
            Duration::from_secs(5),
        )
        .unwrap();

        let path = storage.object_path();
        assert!(path.starts_with("wardrobe/generated_"));
        assert!(path.ends_with(".png"));
        assert_eq!(
            storage.public_url(&path),
            format!("https://proj.supabase.co/storage/v1/object/public/wardrobe/{path}")
        );
    }
}
