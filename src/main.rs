//! Binary entrypoint (expanded component C14): load config, init logging,
//! connect the pool, spawn N job-runner loops plus the HTTP surface, and
//! drain on SIGINT/SIGTERM.

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use segmenter::api::{router, ApiState};
use segmenter::config::Config;
use segmenter::db;
use segmenter::job_runner::run_loop;
use segmenter::logging;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = Config::from_env()?;
    info!(worker_count = config.worker_count, port = config.port, "starting segmenter");

    let pool = db::connect(&config.database_url, config.worker_count as u32 + 4).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut worker_handles = Vec::with_capacity(config.worker_count);
    for _ in 0..config.worker_count {
        let pool = pool.clone();
        let strategy = config.strategy;
        let poll_interval = config.poll_interval;
        let shutdown_rx = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(run_loop(pool, strategy, poll_interval, shutdown_rx)));
    }

    let app = router(ApiState { pool: pool.clone() }).layer(tower_http::trace::TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_tx));

    server.await?;

    for handle in worker_handles {
        handle.await?;
    }

    info!("segmenter shut down cleanly");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);
}
