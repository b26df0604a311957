//! Short-link redirection manager: companies register under a short code and
//! attach weighted target links; `GET /go/{code}` picks the least-hit active
//! link and 302s to it, so traffic converges toward an even split.

use axum::{
    http::StatusCode,
    routing::get,
    Router,
};
use std::sync::Arc;

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;

use cache::CodeCache;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub db: sqlx::SqlitePool,
    /// In-memory short_code → record id map so repeat visitors skip the
    /// lookup query; destinations are never cached.
    pub cache: CodeCache,
}

// ── Router ─────────────────────────────────────────────────────────────────

/// Build the full application router. Layers (tracing, CORS) are attached by
/// the binary so tests can drive this router directly.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/",
            get(|| async { "Redirect Link Manager backend is running." }),
        )
        .route("/health", get(|| async { StatusCode::OK }))
        .route(
            "/api/redirects",
            get(handlers::api::list_redirects).post(handlers::api::create_redirect),
        )
        // GET resolves by short code; PUT/DELETE address the record id.
        .route(
            "/api/redirects/:key",
            get(handlers::api::get_redirect)
                .put(handlers::api::update_redirect)
                .delete(handlers::api::delete_redirect),
        )
        .route("/go/:short_code", get(handlers::redirect::redirect))
        .with_state(state)
}
