use crate::{
    cache::CodeCache,
    models::{Redirect, RedirectWithLinks, TargetLink, TargetLinkInput},
};
use sqlx::SqlitePool;

// ── Warm-up ────────────────────────────────────────────────────────────────

/// Load every short code → record id mapping into the in-memory cache at
/// startup.
pub async fn warm_cache(pool: &SqlitePool, cache: &CodeCache) -> anyhow::Result<()> {
    let rows: Vec<(String, i64)> = sqlx::query_as("SELECT short_code, id FROM redirects")
        .fetch_all(pool)
        .await?;

    let count = rows.len();
    for (short_code, id) in rows {
        cache.set(short_code, id);
    }

    tracing::info!("Cache warmed with {} redirect record(s)", count);
    Ok(())
}

// ── Redirect records ───────────────────────────────────────────────────────

/// Resolve a short code to its record id (read path of the redirect route).
pub async fn get_redirect_id_by_code(
    pool: &SqlitePool,
    short_code: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM redirects WHERE short_code = ?1")
        .bind(short_code)
        .fetch_optional(pool)
        .await
}

pub async fn redirect_exists(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM redirects WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(found.is_some())
}

/// Fetch a single record by its primary key, without links.
pub async fn get_redirect_by_id(
    pool: &SqlitePool,
    id: i64,
) -> Result<Option<Redirect>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, company_name, short_code, created_at, updated_at
         FROM redirects WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Fetch a single record by company name (names are stored lowercased, so
/// callers must lowercase before lookup).
pub async fn get_redirect_by_company(
    pool: &SqlitePool,
    company_name: &str,
) -> Result<Option<Redirect>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, company_name, short_code, created_at, updated_at
         FROM redirects WHERE company_name = ?1",
    )
    .bind(company_name)
    .fetch_optional(pool)
    .await
}

/// Fetch a record with its ordered target links by short code.
pub async fn get_redirect_by_code(
    pool: &SqlitePool,
    short_code: &str,
) -> Result<Option<RedirectWithLinks>, sqlx::Error> {
    let redirect: Option<Redirect> = sqlx::query_as(
        "SELECT id, company_name, short_code, created_at, updated_at
         FROM redirects WHERE short_code = ?1",
    )
    .bind(short_code)
    .fetch_optional(pool)
    .await?;

    match redirect {
        Some(r) => Ok(Some(with_links(pool, r).await?)),
        None => Ok(None),
    }
}

/// Return all records with their links, newest first.
pub async fn get_all_redirects(pool: &SqlitePool) -> Result<Vec<RedirectWithLinks>, sqlx::Error> {
    let redirects: Vec<Redirect> = sqlx::query_as(
        "SELECT id, company_name, short_code, created_at, updated_at
         FROM redirects ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    let mut result = Vec::with_capacity(redirects.len());
    for redirect in redirects {
        result.push(with_links(pool, redirect).await?);
    }

    Ok(result)
}

/// Insert a new record (no links yet) and return the created row.
pub async fn create_redirect(
    pool: &SqlitePool,
    company_name: &str,
    short_code: &str,
) -> Result<RedirectWithLinks, sqlx::Error> {
    let id = sqlx::query("INSERT INTO redirects (company_name, short_code) VALUES (?1, ?2)")
        .bind(company_name)
        .bind(short_code)
        .execute(pool)
        .await?
        .last_insert_rowid();

    let redirect: Redirect = sqlx::query_as(
        "SELECT id, company_name, short_code, created_at, updated_at
         FROM redirects WHERE id = ?1",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    with_links(pool, redirect).await
}

/// Replace a record's company name and whole target-link list in one
/// transaction. This whole-array replace is only for infrequent admin edits;
/// the hit-increment path never goes through here.
pub async fn update_redirect(
    pool: &SqlitePool,
    id: i64,
    company_name: &str,
    links: &[TargetLinkInput],
) -> Result<Option<RedirectWithLinks>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let affected = sqlx::query(
        "UPDATE redirects SET company_name = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
    )
    .bind(company_name)
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if affected == 0 {
        return Ok(None);
    }

    sqlx::query("DELETE FROM target_links WHERE redirect_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for (position, link) in links.iter().enumerate() {
        sqlx::query(
            "INSERT INTO target_links (redirect_id, position, name, url, active, hits)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(id)
        .bind(position as i64)
        .bind(link.name.trim())
        .bind(link.url.trim())
        .bind(link.active)
        .bind(link.hits)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let redirect: Redirect = sqlx::query_as(
        "SELECT id, company_name, short_code, created_at, updated_at
         FROM redirects WHERE id = ?1",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(Some(with_links(pool, redirect).await?))
}

/// Permanently delete a record (cascades to its links via FK).
pub async fn delete_redirect(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("DELETE FROM redirects WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

// ── Target links ───────────────────────────────────────────────────────────

/// A record's links in stored order.
pub async fn get_target_links(
    pool: &SqlitePool,
    redirect_id: i64,
) -> Result<Vec<TargetLink>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, name, url, active, hits
         FROM target_links WHERE redirect_id = ?1 ORDER BY position ASC",
    )
    .bind(redirect_id)
    .fetch_all(pool)
    .await
}

/// Pick the least-loaded active link of a record and increment its hit
/// counter, as a single atomic statement.
///
/// Selection and increment are indivisible: two concurrent resolutions for
/// the same record can never both choose from the same stale baseline, and
/// the increment has committed if and only if a row comes back. Ties on
/// `hits` break to the smallest `position`, so the choice is deterministic.
///
/// Returns `None` when the record has no active links (or does not exist —
/// the caller distinguishes via [`redirect_exists`]).
pub async fn select_and_increment(
    pool: &SqlitePool,
    redirect_id: i64,
) -> Result<Option<TargetLink>, sqlx::Error> {
    // `fetch_all`, not `fetch_optional`: abandoning a write-with-RETURNING
    // statement after its first row leaves the implicit transaction open on
    // the pooled connection, so the increment would not be committed when
    // this function returns. Stepping to completion upholds the contract
    // above. At most one row can match the LIMIT 1 subquery.
    let mut rows: Vec<TargetLink> = sqlx::query_as(
        "UPDATE target_links
         SET hits = hits + 1
         WHERE id = (SELECT id FROM target_links
                     WHERE redirect_id = ?1 AND active = 1
                     ORDER BY hits ASC, position ASC
                     LIMIT 1)
         RETURNING id, name, url, active, hits",
    )
    .bind(redirect_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.pop())
}

// ── Private helpers ────────────────────────────────────────────────────────

async fn with_links(
    pool: &SqlitePool,
    redirect: Redirect,
) -> Result<RedirectWithLinks, sqlx::Error> {
    let target_links = get_target_links(pool, redirect.id).await?;

    Ok(RedirectWithLinks {
        id: redirect.id,
        company_name: redirect.company_name,
        short_code: redirect.short_code,
        target_links,
        created_at: redirect.created_at,
        updated_at: redirect.updated_at,
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetLinkInput;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    async fn test_pool() -> SqlitePool {
        let options = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()
            .unwrap()
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn link(name: &str, url: &str, active: bool, hits: i64) -> TargetLinkInput {
        TargetLinkInput {
            name: name.to_owned(),
            url: url.to_owned(),
            active,
            hits,
        }
    }

    async fn seed(pool: &SqlitePool, links: &[TargetLinkInput]) -> i64 {
        let created = create_redirect(pool, "acme", "abc1234").await.unwrap();
        update_redirect(pool, created.id, "acme", links)
            .await
            .unwrap()
            .unwrap();
        created.id
    }

    #[tokio::test]
    async fn select_prefers_strictly_smallest_hits() {
        let pool = test_pool().await;
        let id = seed(
            &pool,
            &[
                link("a", "https://a.example.com", true, 5),
                link("b", "https://b.example.com", true, 2),
            ],
        )
        .await;

        let chosen = select_and_increment(&pool, id).await.unwrap().unwrap();
        assert_eq!(chosen.url, "https://b.example.com");
        assert_eq!(chosen.hits, 3);
    }

    #[tokio::test]
    async fn select_breaks_ties_by_stored_order() {
        let pool = test_pool().await;
        let id = seed(
            &pool,
            &[
                link("a", "https://a.example.com", true, 3),
                link("b", "https://b.example.com", true, 3),
                link("c", "https://c.example.com", false, 1),
            ],
        )
        .await;

        // First pick: a and b tie at 3, a is first in stored order; the
        // inactive c with the globally smallest count never interferes.
        let first = select_and_increment(&pool, id).await.unwrap().unwrap();
        assert_eq!(first.url, "https://a.example.com");
        assert_eq!(first.hits, 4);

        // Second pick: b is now the strict minimum among active links.
        let second = select_and_increment(&pool, id).await.unwrap().unwrap();
        assert_eq!(second.url, "https://b.example.com");
        assert_eq!(second.hits, 4);
    }

    #[tokio::test]
    async fn select_skips_inactive_links() {
        let pool = test_pool().await;
        let id = seed(
            &pool,
            &[
                link("off", "https://off.example.com", false, 0),
                link("on", "https://on.example.com", true, 9),
            ],
        )
        .await;

        let chosen = select_and_increment(&pool, id).await.unwrap().unwrap();
        assert_eq!(chosen.url, "https://on.example.com");

        let links = get_target_links(&pool, id).await.unwrap();
        assert_eq!(links[0].hits, 0, "inactive link's counter stays frozen");
    }

    #[tokio::test]
    async fn select_returns_none_without_active_links() {
        let pool = test_pool().await;
        let id = seed(&pool, &[link("off", "https://off.example.com", false, 0)]).await;

        assert!(select_and_increment(&pool, id).await.unwrap().is_none());
        // Unknown record behaves the same at this layer.
        assert!(select_and_increment(&pool, id + 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn increment_touches_parent_updated_at() {
        let pool = test_pool().await;
        let id = seed(&pool, &[link("a", "https://a.example.com", true, 0)]).await;

        // Force a visibly older timestamp, then resolve once.
        sqlx::query("UPDATE redirects SET updated_at = '2000-01-01 00:00:00' WHERE id = ?1")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        select_and_increment(&pool, id).await.unwrap().unwrap();

        let redirect = get_redirect_by_id(&pool, id).await.unwrap().unwrap();
        assert!(chrono::Datelike::year(&redirect.updated_at) > 2000);
    }

    #[tokio::test]
    async fn update_replaces_whole_link_list() {
        let pool = test_pool().await;
        let id = seed(
            &pool,
            &[
                link("a", "https://a.example.com", true, 7),
                link("b", "https://b.example.com", true, 7),
            ],
        )
        .await;

        let updated = update_redirect(
            &pool,
            id,
            "acme widgets",
            &[link("c", "https://c.example.com", true, 0)],
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(updated.company_name, "acme widgets");
        assert_eq!(updated.target_links.len(), 1);
        assert_eq!(updated.target_links[0].url, "https://c.example.com");
        assert_eq!(updated.target_links[0].hits, 0);
    }

    #[tokio::test]
    async fn update_unknown_record_is_none() {
        let pool = test_pool().await;
        assert!(update_redirect(&pool, 42, "ghost", &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_links() {
        let pool = test_pool().await;
        let id = seed(&pool, &[link("a", "https://a.example.com", true, 0)]).await;

        assert!(delete_redirect(&pool, id).await.unwrap());
        assert!(get_target_links(&pool, id).await.unwrap().is_empty());
        assert!(!delete_redirect(&pool, id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_company_name_violates_unique_constraint() {
        let pool = test_pool().await;
        create_redirect(&pool, "acme", "code0001").await.unwrap();

        let err = create_redirect(&pool, "acme", "code0002").await.unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }
}
