//! Job handlers invoked by the queue processor.
//!
//! Handlers must tolerate being called more than once for the same logical job:
//! delivery is at-least-once and failed jobs are requeued.

pub mod image_generation;
pub mod items;
pub mod openai;
pub mod storage;

use async_trait::async_trait;
use serde::Serialize;

use fitcheck_core::ImageJobPayload;

pub use image_generation::{ArtifactStore, ImageGenerationHandler, ImageGenerator, ItemRepository};
pub use items::PostgresItemRepository;
pub use openai::OpenAiImageGenerator;
pub use storage::SupabaseStorage;

/// Handler error. Treated by the processor exactly like an unsuccessful outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("image generation failed: {0}")]
    Generation(String),
    #[error("artifact upload failed: {0}")]
    Upload(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for HandlerError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

/// Outcome of a handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl ToString) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.to_string()),
        }
    }

    /// Human-readable failure description, for requeue logs.
    pub fn describe(&self) -> String {
        match &self.error {
            Some(error) => format!("{}: {}", self.message, error),
            None => self.message.clone(),
        }
    }
}

/// Processes one parsed job payload.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &ImageJobPayload) -> Result<JobOutcome, HandlerError>;
}
