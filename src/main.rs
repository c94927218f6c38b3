use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, config_from_env, router};
use ipd_core::IpdService;

/// Main entry point for the IPD application
///
/// Loads `.env`, resolves the core configuration once and serves the REST API until Ctrl-C.
///
/// # Environment Variables
/// - `IPD_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `IPD_DATA_DIR`: Directory for episode repositories (default: "ipd_data")
/// - `IPD_CARE_LOCATION`: Care location recorded on every commit
/// - `IPD_ACCESS_POLICY`: Optional YAML file overriding the default access policy
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, binding or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ipd_run=info".parse()?)
                .add_directive("ipd_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("IPD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let cfg = config_from_env()?;

    tracing::info!("++ Starting IPD REST on {}", rest_addr);
    tracing::info!(
        "++ Data directory {} ({})",
        cfg.data_dir().display(),
        cfg.care_location()
    );

    let app = router(AppState {
        service: IpdService::with_defaults(cfg),
    });

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("-- Shutting down");
        })
        .await?;

    Ok(())
}
