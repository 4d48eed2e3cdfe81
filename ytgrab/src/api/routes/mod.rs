//! API route modules.

pub mod download;
pub mod health;
pub mod info;

use axum::Router;

use crate::api::server::AppState;

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(info::router())
        .merge(download::router())
        .nest("/health", health::router())
        .with_state(state)
}
