//! Service wiring: Postgres-backed queue and ledger, HTTP-backed image handler.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use fitcheck_infra::QueueProcessor;
use fitcheck_infra::handler::{
    ImageGenerationHandler, OpenAiImageGenerator, PostgresItemRepository, SupabaseStorage,
};
use fitcheck_infra::ledger::PostgresRateLimitStore;
use fitcheck_infra::queue::PgmqJobQueue;

use crate::settings::WorkerSettings;

pub async fn connect(settings: &WorkerSettings) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to postgres")
}

/// Build the processor and make sure its queue exists.
pub async fn build_processor(settings: &WorkerSettings, pool: PgPool) -> anyhow::Result<Arc<QueueProcessor>> {
    let queue = PgmqJobQueue::new(pool.clone());
    queue
        .ensure_queue(&settings.processor.queue_name)
        .await
        .context("failed to create job queue")?;

    let generator = OpenAiImageGenerator::new(settings.openai_api_key.clone(), settings.http_timeout)
        .context("failed to build image api client")?;
    let storage = SupabaseStorage::new(
        settings.supabase_url.clone(),
        settings.supabase_service_key.clone(),
        settings.storage_bucket.clone(),
        settings.http_timeout,
    )
    .context("failed to build storage client")?;
    let handler = ImageGenerationHandler::new(
        Arc::new(generator),
        Arc::new(storage),
        Arc::new(PostgresItemRepository::new(pool.clone())),
    );

    Ok(Arc::new(QueueProcessor::new(
        settings.processor.clone(),
        Arc::new(PostgresRateLimitStore::new(pool)),
        Arc::new(queue),
        Arc::new(handler),
    )))
}
