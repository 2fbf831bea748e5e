use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::AdminToken;
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::push_config())
        .merge(routes::audience())
        .merge(routes::broadcasts())
        .merge(routes::tokens())
        .with_state(state)
}
