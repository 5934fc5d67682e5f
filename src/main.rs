// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use live_telemetry::application::catalog_sync::CatalogSync;
use live_telemetry::application::connection::ConnectionManager;
use live_telemetry::application::ingestion::IngestionPipeline;
use live_telemetry::application::projection::ProjectionEmitter;
use live_telemetry::application::store::shared_store;
use live_telemetry::application::unit_control::UnitControlService;
use live_telemetry::infrastructure::config::load_client_config;
use live_telemetry::infrastructure::feed_url::FeedEndpoints;
use live_telemetry::infrastructure::http_catalog::HttpCatalogRepository;
use live_telemetry::infrastructure::ws_transport::WsTransport;
use live_telemetry::presentation::{app_state::AppState, router};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_client_config().context("loading client configuration")?;
    let session = config.initial_session();

    // Owned state and projection (application layer)
    let store = shared_store();
    let emitter = ProjectionEmitter::new(store.clone(), session.window, config.projection.throttle());
    let pipeline = IngestionPipeline::new(
        store,
        emitter.clone(),
        config.retention,
        config.status.clone(),
    );

    // Adapters (infrastructure layer)
    let repository = Arc::new(HttpCatalogRepository::new(config.server.api_url.clone()));
    let transport = Arc::new(WsTransport);
    let feed = FeedEndpoints::new(
        config.server.ws_url.clone(),
        config.server.all_units_path.clone(),
        config.server.unit_path.clone(),
    );

    let catalog_sync = Arc::new(CatalogSync::new(
        repository.clone(),
        pipeline.clone(),
        config.catalog.clone(),
    ));
    let connection = Arc::new(ConnectionManager::new(
        transport,
        pipeline.clone(),
        catalog_sync,
        feed,
        config.connection,
    ));
    let control = UnitControlService::new(repository, pipeline);

    connection
        .connect(session)
        .await
        .context("opening initial session")?;

    // Create application state
    let state = Arc::new(AppState {
        connection: connection.clone(),
        projection: emitter,
        control,
        point_budgets: config.point_budgets.clone(),
    });

    // Start server
    let addr: SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.http.bind))?;
    tracing::info!("Starting live-telemetry bridge on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    connection.disconnect(true).await;
    Ok(())
}
