use std::sync::Arc;

use specforge_crawler::HttpFetcherFactory;
use specforge_db::stores::{PgSchemaStore, PgSubscriptionStore};
use specforge_events::WebhookNotifier;
use specforge_queue::PgJobQueue;
use specforge_worker::generator::HttpCodeGenerator;
use specforge_worker::{JobContext, Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "specforge_worker=debug,specforge_crawler=info,specforge_events=info,specforge_queue=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    tracing::info!(
        concurrency = config.concurrency,
        max_crawl_depth = config.max_crawl_depth,
        download_dir = %config.download_dir.display(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = specforge_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    specforge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    specforge_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Collaborators ---
    let generator_url = std::env::var("GENERATOR_URL").expect("GENERATOR_URL must be set");
    let generator = HttpCodeGenerator::new(&generator_url, config.generator_timeout);
    let notifier = WebhookNotifier::new(Arc::new(PgSubscriptionStore::new(pool.clone())));

    let ctx = JobContext {
        queue: Arc::new(PgJobQueue::new(pool.clone()).with_lease(config.job_lease)),
        schemas: Arc::new(PgSchemaStore::new(pool.clone())),
        generator: Arc::new(generator),
        notifier: Arc::new(notifier),
        fetchers: Arc::new(HttpFetcherFactory),
        config,
    };
    let worker = Worker::new(ctx);

    // --- Run ---
    let shutdown = CancellationToken::new();
    let worker_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };

    shutdown_signal().await;
    shutdown.cancel();

    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Worker task panicked");
    }
    pool.close().await;
    tracing::info!("Shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
