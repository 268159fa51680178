//! Image-generation job handler.
//!
//! Generates an image for the item's prompt, copies it into durable storage and
//! points the item record at the stored copy. Each step sits behind a trait so
//! the handler can run against fakes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use fitcheck_core::{ImageJobPayload, ItemId};

use super::{HandlerError, JobHandler, JobOutcome};

/// Text-to-image backend. Returns the URL of the generated image, if any.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, HandlerError>;
}

/// Durable storage for generated artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the image at `source_url`, store it and return its public URL.
    async fn store_from_url(&self, source_url: &str) -> Result<String, HandlerError>;
}

/// Target records updated with the stored image.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Setting the same URL twice must leave the record unchanged.
    async fn set_image_url(&self, item_id: &ItemId, image_url: &str) -> Result<(), HandlerError>;
}

pub struct ImageGenerationHandler {
    generator: Arc<dyn ImageGenerator>,
    artifacts: Arc<dyn ArtifactStore>,
    items: Arc<dyn ItemRepository>,
}

impl ImageGenerationHandler {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        artifacts: Arc<dyn ArtifactStore>,
        items: Arc<dyn ItemRepository>,
    ) -> Self {
        Self {
            generator,
            artifacts,
            items,
        }
    }
}

#[async_trait]
impl JobHandler for ImageGenerationHandler {
    async fn handle(&self, payload: &ImageJobPayload) -> Result<JobOutcome, HandlerError> {
        let item_id = &payload.item_id;

        let generated = match self.generator.generate(&payload.text_prompt).await {
            Ok(url) => url,
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "failed to generate image for item");
                return Ok(JobOutcome::failed("Failed to generate image", e));
            }
        };

        // No URL from the generator leaves the item with an empty image.
        let image_url = match generated {
            Some(url) => match self.artifacts.store_from_url(&url).await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(item_id = %item_id, error = %e, "failed to fetch/upload generated image");
                    return Ok(JobOutcome::failed("Failed to fetch/upload generated image.", e));
                }
            },
            None => String::new(),
        };

        if let Err(e) = self.items.set_image_url(item_id, &image_url).await {
            warn!(item_id = %item_id, error = %e, "item update failed");
            return Ok(JobOutcome::failed("Database Update Error.", e));
        }

        debug!(item_id = %item_id, image_url = %image_url, "image generated and saved");
        Ok(JobOutcome::succeeded("Image generated and saved successfully."))
    }
}
