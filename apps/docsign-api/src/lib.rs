//! DocSign API - Backend for template completion and signing
//!
//! Provides REST endpoints for:
//! - Template and signing request intake
//! - Field capture over a recipient's signing link
//! - Submission and completed document lookup

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod blob;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod state;
pub mod store;

pub use config::Config;
pub use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Intake
        .route("/api/templates", post(handlers::create_template))
        .route("/api/requests", post(handlers::create_signing_request))
        // Recipient session
        .route("/api/sign/:token", get(handlers::get_session))
        .route("/api/sign/:token/fields/:field_id", put(handlers::put_field))
        .route(
            "/api/sign/:token/signature/:field_id",
            put(handlers::put_signature).delete(handlers::delete_signature),
        )
        .route(
            "/api/sign/:token/signature/:field_id/strokes",
            post(handlers::post_stroke).delete(handlers::undo_stroke),
        )
        .route("/api/sign/:token/validation", get(handlers::get_validation))
        .route("/api/sign/:token/submit", post(handlers::submit))
        // Completed documents
        .route(
            "/api/completed/:signing_request_id",
            get(handlers::get_completed),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
