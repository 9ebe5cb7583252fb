pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod services;
pub mod state;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::config::ApiConfig;
use crate::state::AppState;

/// Routes with request tracing; no compression
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/:user_id", get(handlers::device_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn app_with_config(state: AppState, api: &ApiConfig) -> Router {
    let router = app(state);
    if api.enable_response_compression {
        router.layer(CompressionLayer::new())
    } else {
        router
    }
}
