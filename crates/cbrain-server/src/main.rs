mod api;
mod middleware;
mod scheduler;
mod worker;

use std::sync::Arc;

use cbrain_brain::ContentBrain;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
    worker::WorkerSettings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(cbrain_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = cbrain_db::PoolConfig::from_app_config(&config);
    let pool = cbrain_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = cbrain_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let brain = Arc::new(ContentBrain::from_app_config(pool.clone(), &config)?);

    let _scheduler = scheduler::build_scheduler(pool.clone(), &config.analysis_cron).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(worker::run(
        pool.clone(),
        Arc::clone(&brain),
        WorkerSettings::from_app_config(&config),
        shutdown_rx,
    ));

    let auth = AuthState::from_env(matches!(config.env, cbrain_core::Environment::Development))?;
    let app = build_app(AppState { pool }, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "cbrain-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send(true).ok();
    worker.await?;
    tracing::info!("worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
