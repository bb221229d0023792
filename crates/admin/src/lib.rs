//! Storekeep embedded admin library.
//!
//! An app that runs inside the Shopify admin iframe: plan billing (recurring,
//! usage and one-time charges with promo codes), discount and product
//! metafield editing, a Postgres-backed job queue for email, image and report
//! work, file uploads, and a streaming merchant assistant.
//!
//! The binary in `main.rs` wires these pieces into a server; the library is
//! split out so the CLI and integration tests can reuse them.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod claude;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod routes;
pub mod services;
pub mod shopify;
pub mod state;

use axum::Router;
use tower_http::services::ServeDir;
use tower_sessions::SessionManagerLayer;
use tower_sessions_sqlx_store::PostgresStore;

use crate::state::AppState;

/// Directory served under `/static`, relative to the workspace root.
pub const STATIC_DIR: &str = "crates/admin/static";

/// The application router with its per-request layers.
///
/// Tracing and Sentry layers are added by the binary.
pub fn app(state: AppState, session_layer: SessionManagerLayer<PostgresStore>) -> Router {
    Router::new()
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(session_layer)
        .with_state(state)
}
