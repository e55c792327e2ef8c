//! `rideshare serve`: the engine behind a JSON HTTP API.
//!
//! Endpoints:
//! - GET  /health
//! - GET  /rides/{id}
//! - GET  /rides/{id}/history
//! - GET  /rides/{id}/eligibility/{driver_id}
//! - POST /rides/{id}/driver-actions
//! - POST /rides/{id}/passenger-cancel
//! - POST /rides/{id}/admin-actions
//! - GET  /admin-actions
//!
//! Errors are `{"code": <result code>, "error": <message>}`. CORS is
//! permissive and every client IP is rate limited per minute.

mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use rideshare_engine::{AdminFacade, TransitionEngine};
use rideshare_storage::RideStorage;
use tower_http::cors::{Any, CorsLayer};

use self::handlers::{
    handle_admin_action, handle_driver_action, handle_eligibility, handle_get_ride,
    handle_health, handle_history, handle_list_admin_actions, handle_not_found,
    handle_passenger_cancel,
};
use self::middleware::rate_limit_middleware;
use self::state::{AppState, RateLimiter};

/// Request bodies are small JSON documents.
const MAX_BODY_SIZE: usize = 64 * 1024;

const RATE_LIMIT_WINDOW_SECS: u64 = 60;

pub(crate) fn router<S: RideStorage>(engine: Arc<TransitionEngine<S>>, rate_limit: u64) -> Router {
    let state = Arc::new(AppState {
        admin: AdminFacade::new(engine.clone()),
        engine,
    });
    let limiter = Arc::new(RateLimiter::new(rate_limit));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/rides/{id}", get(handle_get_ride::<S>))
        .route("/rides/{id}/history", get(handle_history::<S>))
        .route(
            "/rides/{id}/eligibility/{driver_id}",
            get(handle_eligibility::<S>),
        )
        .route("/rides/{id}/driver-actions", post(handle_driver_action::<S>))
        .route(
            "/rides/{id}/passenger-cancel",
            post(handle_passenger_cancel::<S>),
        )
        .route("/rides/{id}/admin-actions", post(handle_admin_action::<S>))
        .route("/admin-actions", get(handle_list_admin_actions::<S>))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

pub(crate) async fn start_server<S: RideStorage>(
    engine: Arc<TransitionEngine<S>>,
    port: u16,
    rate_limit: u64,
) -> std::io::Result<()> {
    let app = router(engine, rate_limit);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, rate_limit, "rideshare API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for Ctrl+C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
