//! Baanboard API Gateway
//!
//! The HTTP entry point for the listing marketplace.
//! Handles:
//! - Authentication of agent sessions
//! - Rate limiting
//! - Request routing to the listing services
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod state;

use anyhow::Context;
use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    BoxError, Router,
};
use baanboard_common::{
    billing::{HttpSubscriptionProvider, SubscriptionProvider},
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, MemoryStore, Repository},
    errors::Result,
    metrics,
    storage::{HttpBlobStore, MemoryBlobStore},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use state::{AppState, Backends};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    info!("Starting Baanboard API Gateway v{}", baanboard_common::VERSION);

    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exposed on {}", addr);
    }
    metrics::register_metrics();

    let backends = connect_backends(&config).await?;
    let state = AppState::new(config, backends)?;
    let config = state.config.clone();

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    let grace = config.shutdown_timeout();

    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => warn!(
            grace_secs = grace.as_secs(),
            "Graceful shutdown timed out, dropping open connections"
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logging {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// PostgreSQL and the storage REST endpoint, or in-process stand-ins when
/// `database.in_memory` is set
async fn connect_backends(config: &AppConfig) -> Result<Backends> {
    let billing: Arc<dyn SubscriptionProvider> =
        Arc::new(HttpSubscriptionProvider::new(config.billing.clone())?);

    if config.database.in_memory {
        warn!("Serving from an in-memory store, nothing will be persisted");
        let store = Arc::new(MemoryStore::new());
        return Ok(Backends {
            db: None,
            catalog_store: store.clone(),
            listing_store: store,
            blobs: Arc::new(MemoryBlobStore::new()),
            billing,
        });
    }

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Arc::new(Repository::new(db.clone()));

    Ok(Backends {
        db: Some(db),
        catalog_store: repository.clone(),
        listing_store: repository,
        blobs: Arc::new(HttpBlobStore::new(&config.storage)?),
        billing,
    })
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Multipart framing on top of the image itself
    let upload_limit = state.config.storage.max_upload_bytes + 64 * 1024;

    let mut api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Reference data
        .route("/reference", get(handlers::reference::reference))

        // Listings
        .route("/listings", post(handlers::listings::create_listing))
        .route("/listings/search", post(handlers::listings::search))
        .route("/listings/mine", get(handlers::listings::my_listings))
        .route("/listings/archived", get(handlers::listings::archived))
        .route(
            "/listings/{id}",
            put(handlers::listings::update_listing).delete(handlers::listings::delete_listing),
        )
        .route("/listings/{id}/contact", get(handlers::listings::contact))

        // Media
        .route(
            "/media/listing-images",
            post(handlers::media::upload_listing_image)
                .layer(DefaultBodyLimit::max(upload_limit))
                .delete(handlers::media::delete_listing_image),
        )
        .route(
            "/media/avatar",
            post(handlers::media::upload_avatar).layer(DefaultBodyLimit::max(upload_limit)),
        )

        // Billing
        .route("/billing/checkout", post(handlers::billing::checkout))
        .route("/billing/portal", get(handlers::billing::portal))

        .route_layer(axum::middleware::from_fn(middleware::metrics::track_requests));

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter =
            middleware::rate_limit::create_rate_limiter(limits.requests_per_second, limits.burst);
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit,
        ));
    }

    let timeout = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_middleware_error))
        .timeout(state.config.request_timeout());

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

async fn handle_middleware_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!("Request timed out");
        (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
    }
}

/// Cancels `shutdown` on Ctrl+C or SIGTERM
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
    shutdown.cancel();
}

#[cfg(test)]
pub(crate) mod test_support;
