use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe in-memory cache mapping short_code -> redirect record id.
///
/// Backed by a DashMap so lookups for different short codes never contend on
/// a shared lock. Only the code→id association is cached — it is immutable
/// for the lifetime of a record — never the selected destination, which must
/// always come from the store so the hit counters stay authoritative.
///
/// Warmed on startup from the `redirects` table, then kept in sync by the
/// admin handlers (insert on create, remove on delete).
#[derive(Clone, Debug)]
pub struct CodeCache {
    inner: Arc<DashMap<String, i64>>,
}

impl CodeCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Insert or update a mapping.
    pub fn set(&self, short_code: impl Into<String>, redirect_id: i64) {
        self.inner.insert(short_code.into(), redirect_id);
    }

    /// Look up a short code.
    pub fn get(&self, short_code: &str) -> Option<i64> {
        self.inner.get(short_code).map(|v| *v)
    }

    /// Remove a mapping (when a record is deleted).
    pub fn remove(&self, short_code: &str) {
        self.inner.remove(short_code);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::new()
    }
}
