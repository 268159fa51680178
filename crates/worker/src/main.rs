use fitcheck_infra::ProcessorWorker;
use fitcheck_worker::{app, services, settings::WorkerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fitcheck_observability::init();

    let settings = WorkerSettings::from_env()?;
    let pool = services::connect(&settings).await?;
    let processor = services::build_processor(&settings, pool).await?;

    let worker = ProcessorWorker::spawn("image-generation", processor.clone(), settings.processor.tick_interval);

    let router = app::build_router(processor.stats());
    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        queue = %settings.processor.queue_name,
        rate_limit = settings.processor.rate_limit,
        "listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("shutting down processor worker");
    worker.shutdown().await;
    Ok(())
}
