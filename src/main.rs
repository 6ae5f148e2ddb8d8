// main.rs
mod commands;
mod config;
mod devices;
mod discovery;
mod docs;
mod error;
mod events;
mod handlers;
mod metrics;
mod models;
mod status;
mod utils;

use std::sync::Arc;

use commands::{CastLibBackend, CattBackend, ControlBackend, DeviceCommandExecutor};
use config::{ControlBackendKind, DiscoveryBackendKind, Settings};
use devices::{DeviceRegistry, JsonFileStore, SelectionState};
use discovery::{CattScanner, DiscoveryBackend, DiscoveryCoordinator, MdnsScanner};
use events::EventBus;
use models::AppState;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::new()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    let events = Arc::new(EventBus::new());
    metrics::record_events(&events);
    if settings.metrics.enabled {
        metrics::setup_metrics(settings.metrics.port)?;
    }

    let registry = if settings.persistence.enabled {
        let store = JsonFileStore::new(&settings.persistence.path);
        tracing::info!(path = %store.path().display(), "Persisting device list");
        Arc::new(DeviceRegistry::with_store(Arc::new(store)))
    } else {
        Arc::new(DeviceRegistry::new())
    };
    registry.load().await;

    let scanner: Arc<dyn DiscoveryBackend> = match settings.discovery.backend {
        DiscoveryBackendKind::Catt => Arc::new(CattScanner::new(&settings.control.catt_path)),
        DiscoveryBackendKind::Mdns => Arc::new(MdnsScanner::new(settings.discovery.mdns_window())),
    };
    let control: Arc<dyn ControlBackend> = match settings.control.backend {
        ControlBackendKind::Catt => Arc::new(CattBackend::new(&settings.control.catt_path)),
        ControlBackendKind::CastLib => Arc::new(CastLibBackend::new(settings.control.cast_port)),
    };

    let discovery = DiscoveryCoordinator::new(
        scanner,
        registry.clone(),
        events.clone(),
        settings.discovery.cooldown(),
        settings.discovery.timeout(),
    );
    let selection = Arc::new(SelectionState::new(registry.clone()));
    let executor = DeviceCommandExecutor::new(
        selection,
        control,
        events.clone(),
        settings.control.timeout(),
    );
    let state = Arc::new(AppState::new(registry, discovery, executor));

    let app = handlers::router(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", docs::ApiDoc::openapi()))
        .nest_service("/static", ServeDir::new(&settings.server.static_dir))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.server.address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind address: {}", e))?;

    tracing::info!(
        discovery = ?settings.discovery.backend,
        control = ?settings.control.backend,
        "Server started on {}",
        settings.server.address
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
