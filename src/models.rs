use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A company redirect record from the `redirects` table, without its links.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Redirect {
    pub id: i64,
    pub company_name: String,
    pub short_code: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One candidate destination from the `target_links` table.
///
/// The row id is the stable identity of a link: hit increments are keyed on
/// it, so an administrative edit that reorders links cannot misattribute a
/// concurrent increment.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetLink {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub hits: i64,
}

/// A redirect record joined with its ordered target links — the JSON shape
/// served by the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectWithLinks {
    pub id: i64,
    pub company_name: String,
    pub short_code: String,
    pub target_links: Vec<TargetLink>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A target link as submitted in an administrative update. The whole link
/// list is replaced in one transaction, so each entry carries its full state
/// (including `hits`, which an admin edit may deliberately reset).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetLinkInput {
    #[serde(default = "default_link_name")]
    pub name: String,
    pub url: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub hits: i64,
}

fn default_link_name() -> String {
    "New Link".to_owned()
}

fn default_active() -> bool {
    true
}
