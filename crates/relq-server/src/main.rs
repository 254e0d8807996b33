use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use relq_core::{Config, PostgresStore, QueueMetrics, QueueService, Store, Sweeper};
use relq_server::{router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            process::exit(1);
        }
    };

    relq_core::telemetry::init_tracing(&config.log_level);

    let store = match connect_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("storage error: {e}");
            process::exit(1);
        }
    };

    let metrics = Arc::new(QueueMetrics::new()?);
    let shared_store: Arc<dyn Store> = Arc::new(store.clone());

    let service = Arc::new(QueueService::new(
        Arc::clone(&shared_store),
        Arc::clone(&metrics),
        config.visibility_timeout,
        config.receive_max,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(shared_store, Arc::clone(&metrics), config.sweep_interval);
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx));

    let app = router(AppState { service, metrics });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server stopped, quiescing background tasks");

    // In-flight requests have drained; stop the sweeper, then the pool.
    let _ = shutdown_tx.send(true);
    let _ = sweeper_task.await;
    store.close().await;

    Ok(())
}

async fn connect_store(config: &Config) -> relq_core::StoreResult<PostgresStore> {
    let store = PostgresStore::connect(&config.database_url, config.db_connection_timeout).await?;
    store.ping().await?;
    store.migrate().await?;
    info!("database ready");
    Ok(store)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to install CTRL+C handler");
    }

    info!("received shutdown signal");
}
