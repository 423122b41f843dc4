use anyhow::Result;
use arc_swap::ArcSwap;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    access_log::SqliteAccessLogStore,
    config::Config,
    fanout::FanoutAggregator,
    gateway::RequestGateway,
    handlers::{self, AppState},
    job_deletion::JobDeletionWorkflow,
    metadata::MetadataClient,
    metrics,
    observability::{LogExporter, Tracer},
    scheduler::CloudSchedulerClient,
    signals::setup_signal_handlers,
};

/// Start the gateway server
///
/// This function:
/// 1. Initializes metrics
/// 2. Opens the access log and builds the outbound clients
/// 3. Sets up signal handlers for graceful shutdown and config reload
/// 4. Binds to the configured address
/// 5. Serves requests with graceful shutdown support
pub async fn start_server(config: Config, config_path: PathBuf) -> Result<()> {
    let metrics_handle = if config.metrics.enabled {
        info!("Initializing Prometheus metrics...");
        Some(Arc::new(metrics::init_metrics()?))
    } else {
        None
    };

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()?;
    let metadata = Arc::new(MetadataClient::new(
        http_client.clone(),
        config.scheduler.metadata_url.clone(),
    ));

    let project_id = resolve_project_id(&config, &metadata).await;
    let tracer = Tracer::new(
        Arc::new(LogExporter::new(project_id.clone())),
        config.tracing.sample_ratio,
    );

    let store = Arc::new(SqliteAccessLogStore::connect(&config.access_log).await?);
    let scheduler = Arc::new(CloudSchedulerClient::new(
        http_client.clone(),
        &config.scheduler,
        metadata,
    ));

    // Wrap config in ArcSwap for atomic reload support
    let config_swap = Arc::new(ArcSwap::from_pointee(Config {
        project_id,
        ..config.clone()
    }));

    let state = AppState {
        gateway: Arc::new(RequestGateway::new(
            store,
            FanoutAggregator::new(http_client, &config.fanout),
            config_swap.clone(),
            tracer.clone(),
        )),
        deletion: Arc::new(JobDeletionWorkflow::new(
            scheduler,
            tracer,
            Duration::from_secs(config.scheduler.cooldown_seconds),
        )),
    };

    let app = create_router(state, metrics_handle, &config.metrics.endpoint);

    // Setup signal handlers (SIGTERM, SIGINT for shutdown; SIGHUP for reload)
    let (shutdown_tx, signal_handle) = setup_signal_handlers(config_swap, config_path);
    let mut shutdown_rx = shutdown_tx.subscribe();

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting fan-out gateway on {}", addr);
    info!(
        "Configuration: {} fan-out targets, deletion cooldown {}s",
        config.fanout.targets.len(),
        config.scheduler.cooldown_seconds
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Configured project id, else the metadata server's; `None` off Google Cloud
async fn resolve_project_id(config: &Config, metadata: &MetadataClient) -> Option<String> {
    if let Some(project_id) = &config.project_id {
        return Some(project_id.clone());
    }

    match metadata.project_id().await {
        Ok(project_id) => {
            info!(project_id = %project_id, "Resolved project id from metadata server");
            Some(project_id)
        }
        Err(e) => {
            warn!("No project id configured and metadata server unavailable: {}", e);
            None
        }
    }
}

/// Create the Axum router with all routes and middleware
pub fn create_router(
    state: AppState,
    metrics_handle: Option<Arc<PrometheusHandle>>,
    metrics_endpoint: &str,
) -> Router {
    let mut app = Router::new()
        .route(
            "/hello",
            get(handlers::hello::handle_hello).post(handlers::hello::handle_hello),
        )
        .route(
            "/deleteSchedulerJob",
            get(handlers::delete_job::handle_delete_job)
                .post(handlers::delete_job::handle_delete_job),
        )
        .with_state(state)
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    if let Some(handle) = metrics_handle {
        app = app.merge(
            Router::new()
                .route(metrics_endpoint, get(handlers::metrics_handler::metrics))
                .with_state(handle),
        );
    }

    app
        // Form bodies are a single short field
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(TraceLayer::new_for_http())
}
