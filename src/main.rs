use std::sync::Arc;

use anyhow::Context;
use driver_onboard::config::AppConfig;
use driver_onboard::providers::Providers;
use driver_onboard::routes::{ApiState, api_routes};
use driver_onboard::store::LibSqlBackend;
use driver_onboard::workflow::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    eprintln!("🚚 Driver Onboard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.database_path.display());
    eprintln!("   API: http://0.0.0.0:{}/api/drivers", config.listen_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&config.database_path)
            .await
            .with_context(|| {
                format!("failed to open database at {}", config.database_path.display())
            })?,
    );

    // ── Providers + orchestrator ─────────────────────────────────────────
    let providers =
        Providers::from_config(&config.providers).context("failed to build provider clients")?;
    let orchestrator = Arc::new(Orchestrator::new(&providers, db.clone(), db.clone()));

    let app = api_routes(ApiState {
        orchestrator,
        directory: db,
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.listen_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.listen_port))?;
    tracing::info!(port = config.listen_port, "Onboarding API started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}
