use crate::{
    db,
    error::ApiError,
    models::{RedirectWithLinks, TargetLinkInput},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

// ── Request bodies ─────────────────────────────────────────────────────────

// Fields are Options so that a missing field yields our 400 with a JSON
// message instead of the extractor's rejection.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRedirectBody {
    company_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRedirectBody {
    company_name: Option<String>,
    target_links: Option<Vec<TargetLinkInput>>,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /api/redirects
pub async fn list_redirects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RedirectWithLinks>>, ApiError> {
    Ok(Json(db::get_all_redirects(&state.db).await?))
}

/// GET /api/redirects/:short_code
pub async fn get_redirect(
    State(state): State<Arc<AppState>>,
    Path(short_code): Path<String>,
) -> Result<Json<RedirectWithLinks>, ApiError> {
    db::get_redirect_by_code(&state.db, &short_code)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Redirect configuration not found."))
}

/// POST /api/redirects
///
/// Registers a new company and auto-generates its short code. The code is
/// immutable from here on; links are attached later via PUT.
pub async fn create_redirect(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRedirectBody>,
) -> Result<(StatusCode, Json<RedirectWithLinks>), ApiError> {
    let company_name = normalize_company_name(body.company_name.as_deref())?;

    if db::get_redirect_by_company(&state.db, &company_name)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("Company name already exists.".into()));
    }

    let short_code = generate_unique_code(&state.db).await?;

    // The UNIQUE constraint is the real guard against a concurrent create
    // slipping past the check above.
    let redirect = match db::create_redirect(&state.db, &company_name, &short_code).await {
        Ok(r) => r,
        Err(e) if e.to_string().contains("UNIQUE") => {
            return Err(ApiError::Conflict("Company name already exists.".into()));
        }
        Err(e) => return Err(e.into()),
    };

    state.cache.set(&redirect.short_code, redirect.id);
    Ok((StatusCode::CREATED, Json(redirect)))
}

/// PUT /api/redirects/:id
///
/// Replaces the company name and the full target-link list. Whole-array
/// replace is fine here (infrequent, human-driven); the redirect path keeps
/// its own single-field atomic increment.
pub async fn update_redirect(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<UpdateRedirectBody>,
) -> Result<Json<RedirectWithLinks>, ApiError> {
    let id = parse_id(&key)?;

    let (company_name, target_links) = match (body.company_name, body.target_links) {
        (Some(name), Some(links)) => (name, links),
        _ => {
            return Err(ApiError::Validation(
                "Company name and target links array are required.".into(),
            ));
        }
    };

    let company_name = normalize_company_name(Some(company_name.as_str()))?;
    validate_links(&target_links)?;

    let existing = db::get_redirect_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Redirect configuration not found."))?;

    // Check for a duplicate company name only when it actually changes.
    if company_name != existing.company_name
        && db::get_redirect_by_company(&state.db, &company_name)
            .await?
            .is_some()
    {
        return Err(ApiError::Conflict("Company name already exists.".into()));
    }

    db::update_redirect(&state.db, id, &company_name, &target_links)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Redirect configuration not found."))
}

/// DELETE /api/redirects/:id
pub async fn delete_redirect(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&key)?;

    // Fetch first so the short code can be evicted from the cache.
    let existing = db::get_redirect_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Redirect configuration not found."))?;

    if db::delete_redirect(&state.db, id).await? {
        state.cache.remove(&existing.short_code);
        Ok(Json(json!({
            "message": "Redirect configuration deleted successfully."
        })))
    } else {
        Err(ApiError::NotFound("Redirect configuration not found."))
    }
}

// ── Private helpers ────────────────────────────────────────────────────────

/// Company names are stored trimmed and lowercased, which makes the UNIQUE
/// constraint case-insensitive.
fn normalize_company_name(name: Option<&str>) -> Result<String, ApiError> {
    name.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .ok_or_else(|| ApiError::Validation("Company name is required.".into()))
}

fn parse_id(key: &str) -> Result<i64, ApiError> {
    key.parse::<i64>()
        .map_err(|_| ApiError::Validation("Invalid redirect id.".into()))
}

/// Reject malformed link entries before anything is persisted: a negative
/// hit counter anywhere, or an active link whose URL is not a well-formed
/// absolute http(s) URL. Inactive links may carry any URL text — they are
/// retained for audit and excluded from selection.
fn validate_links(links: &[TargetLinkInput]) -> Result<(), ApiError> {
    for link in links {
        if link.hits < 0 {
            return Err(ApiError::Validation(
                "Hit counters must not be negative.".into(),
            ));
        }

        if link.active {
            let valid = url::Url::parse(link.url.trim())
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                return Err(ApiError::Validation(format!(
                    "Active link '{}' must have a well-formed absolute http(s) URL.",
                    link.name
                )));
            }
        }
    }

    Ok(())
}

/// Generate a random 7-character alphanumeric short code that doesn't already
/// exist in the database. Tries up to 10 times before falling back to a
/// longer code (the UNIQUE constraint in the DB is the real guard).
async fn generate_unique_code(pool: &sqlx::SqlitePool) -> Result<String, sqlx::Error> {
    for _ in 0..10 {
        let code = random_code(7);
        if db::get_redirect_id_by_code(pool, &code).await?.is_none() {
            return Ok(code);
        }
    }
    Ok(random_code(9))
}

/// Generate a random alphanumeric string of the given length.
fn random_code(len: usize) -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────────
