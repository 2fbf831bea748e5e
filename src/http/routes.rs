use axum::{routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn push_config() -> Router<AppState> {
    Router::new()
        .route("/v1/push/config", get(handlers::push_config))
        .route("/v1/push/templates", get(handlers::list_templates))
}

pub fn audience() -> Router<AppState> {
    Router::new()
        .route("/v1/push/audience", post(handlers::evaluate_audience))
        .route("/v1/push/audience/summary", get(handlers::audience_summary))
}

pub fn broadcasts() -> Router<AppState> {
    Router::new().route(
        "/v1/push/broadcasts",
        post(handlers::create_broadcast).get(handlers::list_broadcasts),
    )
}

pub fn tokens() -> Router<AppState> {
    Router::new()
        .route("/v1/push/tokens/:recipient_id", get(handlers::get_token))
        .route(
            "/v1/push/tokens/:recipient_id/disable",
            post(handlers::disable_token),
        )
}
