//! HTTP route handlers for Gatehouse.

use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::state::AppState;

mod health;
mod token;
mod verify;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        // Verification
        .route("/verify", post(verify::verify_submission))
        // Render-side artifacts
        .route("/token", post(token::issue_token))
        .route("/honeypot", post(token::honeypot_fields))
        // Request tracing and an outer bound on slow handlers
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        // Add shared state
        .with_state(state)
}
