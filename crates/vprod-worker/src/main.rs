//! Standalone worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vprod_store::{JsonTaskStore, TaskStore};
use vprod_worker::{completion, WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vprod=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vprod-worker");

    let config = WorkerConfig::from_env();
    info!(
        "Worker config: id={}, count={}, tasks_file={}, output_dir={}",
        config.worker_id,
        config.worker_count,
        config.tasks_file.display(),
        config.output_dir.display()
    );

    let store: Arc<dyn TaskStore> = match JsonTaskStore::open(&config.tasks_file).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open task store: {}", e);
            std::process::exit(1);
        }
    };

    let completion = match completion::from_config(&config.completion) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create completion client: {}", e);
            std::process::exit(1);
        }
    };

    let pool = WorkerPool::spawn(&config, store, completion);

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");

    pool.shutdown().await;
    info!("Worker shutdown complete");
}
