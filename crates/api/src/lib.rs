//! HTTP API and process wiring for the order service.
//!
//! Exposes the reservation lifecycle over REST, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use domain::DownpaymentTerms;
use lifecycle::ReservationService;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{CachedOrderRepository, InMemoryOrderCache, InMemoryOrderRepository};
use publisher::EventDispatcher;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::orders::{AppState, SharedRepository};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/reserve", post(routes::orders::reserve))
        .route("/orders/{id}/confirm", post(routes::orders::confirm))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over the given repository and dispatcher.
pub fn create_state(
    repo: SharedRepository,
    dispatcher: EventDispatcher,
    terms: DownpaymentTerms,
) -> Arc<AppState> {
    Arc::new(AppState {
        service: ReservationService::new(repo, dispatcher, terms),
    })
}

/// In-memory store behind an in-memory cache.
pub fn in_memory_repository(cache_ttl: Duration) -> SharedRepository {
    Arc::new(CachedOrderRepository::with_ttl(
        InMemoryOrderRepository::new(),
        InMemoryOrderCache::new(),
        cache_ttl,
    ))
}
