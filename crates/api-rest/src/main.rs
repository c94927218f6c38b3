//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `ipd-run` binary serves the same
//! router.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{config_from_env, router, AppState};
use ipd_core::IpdService;

/// Main entry point for the IPD REST API server.
///
/// # Environment Variables
/// - `IPD_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `IPD_DATA_DIR`, `IPD_CARE_LOCATION`, `IPD_ACCESS_POLICY`: see [`config_from_env`]
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("ipd_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("IPD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let cfg = config_from_env()?;

    tracing::info!(
        data_dir = %cfg.data_dir().display(),
        care_location = cfg.care_location(),
        "-- Starting IPD REST API on {}",
        addr
    );

    let app = router(AppState {
        service: IpdService::with_defaults(cfg),
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
