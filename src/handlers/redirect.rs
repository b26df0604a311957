use crate::{db, AppState};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Outcome of a failed resolution. `NotFound` and `NoActiveLinks` are
/// terminal for the caller; a `Database` failure is transient and the whole
/// resolution is safe to retry, because the hit increment either fully
/// committed (and a URL was returned) or did not happen at all.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("short code is not registered")]
    NotFound,

    #[error("record has no active target links")]
    NoActiveLinks,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Resolve a short code to its next destination.
///
/// 1. Map the short code to a record id — in-memory cache first, store on a
///    miss (the association is immutable, so the cache can never go stale
///    short of a delete).
/// 2. Let the store atomically pick the least-hit active link and increment
///    its counter in one statement. No row back means either the record has
///    no active links, or it was deleted after being cached — the store is
///    re-checked to tell the two apart.
pub async fn resolve(state: &AppState, short_code: &str) -> Result<String, ResolveError> {
    let redirect_id = match state.cache.get(short_code) {
        Some(id) => id,
        None => match db::get_redirect_id_by_code(&state.db, short_code).await? {
            Some(id) => {
                // Backfill the cache for next time
                state.cache.set(short_code, id);
                id
            }
            None => return Err(ResolveError::NotFound),
        },
    };

    match db::select_and_increment(&state.db, redirect_id).await? {
        Some(link) => Ok(link.url),
        None => {
            if db::redirect_exists(&state.db, redirect_id).await? {
                Err(ResolveError::NoActiveLinks)
            } else {
                // Deleted since it was cached; drop the stale entry.
                state.cache.remove(short_code);
                Err(ResolveError::NotFound)
            }
        }
    }
}

/// GET /go/:short_code
///
/// 302 with `Location` on success; 404 with a distinct plain-text message
/// for an unknown code vs a record with nothing active; 500 on a store
/// failure (retryable).
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(short_code): Path<String>,
) -> Response {
    match resolve(&state, &short_code).await {
        Ok(url) => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
        Err(ResolveError::NotFound) => (
            StatusCode::NOT_FOUND,
            "Not Found: The requested redirect link does not exist.",
        )
            .into_response(),
        Err(ResolveError::NoActiveLinks) => (
            StatusCode::NOT_FOUND,
            "No active target links available for this redirect.",
        )
            .into_response(),
        Err(ResolveError::Database(e)) => {
            tracing::error!("Redirect error for '{}': {:?}", short_code, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred during redirection.",
            )
                .into_response()
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
