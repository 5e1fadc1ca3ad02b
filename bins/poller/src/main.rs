//! Tributo polling worker.
//!
//! Composes the issuance service over the database repositories and runs
//! the status-polling sweep until the process is stopped.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tributo_core::dte::{sweep, DteService, IssuerMode};
use tributo_db::{connect, CafRepository, DocumentRepository};
use tributo_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tributo=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Connect to database
    let db = connect(&config.database.url).await?;
    info!("Connected to database");

    // Compose the issuance service over its persistence seams
    let allocator = Arc::new(CafRepository::new(db.clone()));
    let store = Arc::new(DocumentRepository::new(db));
    let service = Arc::new(DteService::new(
        allocator,
        store,
        &config.authority,
        config.signing.clone(),
    )?);

    match service.mode() {
        IssuerMode::Live => info!(environment = ?config.authority.environment, "Running in live mode"),
        IssuerMode::Mock => {
            warn!("No signing credentials configured; running in mock mode");
        }
    }

    info!(
        interval_secs = config.sweep.interval_secs,
        batch_size = config.sweep.batch_size,
        "Starting status-polling sweep"
    );
    sweep::run(service, config.sweep).await;

    Ok(())
}
