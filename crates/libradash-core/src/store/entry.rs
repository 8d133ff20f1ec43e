// ── Cache entries ──
//
// Immutable snapshots of one cached query result. Entries are only
// ever replaced wholesale (copy-on-write); a reader holding an
// `Arc<CacheEntry>` never observes a half-updated object.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::error::CoreError;

/// Per-key query lifecycle: `Idle → Loading → {Success, Error}`,
/// with `Success|Error → Loading` on refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// The stored result, status, and timing metadata for one QueryKey.
///
/// Constructors maintain the invariant `stale_at >= fetched_at`.
/// `Loading` and `Error` entries carry the previous data forward so
/// consumers can keep rendering stale results during a refetch.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Option<Arc<Value>>,
    pub error: Option<Arc<CoreError>>,
    pub status: QueryStatus,
    pub fetched_at: Option<Instant>,
    pub stale_at: Option<Instant>,
    /// Set when the data was substituted by the fallback resolver
    /// rather than fetched live. Status and shape are identical to a
    /// live success -- this marker is the only way to tell them apart.
    pub via_fallback: bool,
}

impl CacheEntry {
    /// A never-fetched entry.
    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Idle,
            fetched_at: None,
            stale_at: None,
            via_fallback: false,
        }
    }

    /// A loading entry that carries the previous result forward.
    pub fn loading_from(prev: Option<&CacheEntry>) -> Self {
        Self {
            data: prev.and_then(|p| p.data.clone()),
            error: None,
            status: QueryStatus::Loading,
            fetched_at: prev.and_then(|p| p.fetched_at),
            stale_at: prev.and_then(|p| p.stale_at),
            via_fallback: prev.is_some_and(|p| p.via_fallback),
        }
    }

    /// A fresh successful result.
    pub fn success(
        data: Arc<Value>,
        now: Instant,
        stale_time: Duration,
        via_fallback: bool,
    ) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: QueryStatus::Success,
            fetched_at: Some(now),
            stale_at: Some(now + stale_time),
            via_fallback,
        }
    }

    /// A terminal failure (retries exhausted). Keeps previous data.
    pub fn failure(error: Arc<CoreError>, prev: Option<&CacheEntry>) -> Self {
        Self {
            data: prev.and_then(|p| p.data.clone()),
            error: Some(error),
            status: QueryStatus::Error,
            fetched_at: prev.and_then(|p| p.fetched_at),
            stale_at: prev.and_then(|p| p.stale_at),
            via_fallback: false,
        }
    }

    /// `true` while the entry is a success within its staleness window.
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.status == QueryStatus::Success && self.stale_at.is_some_and(|t| now < t)
    }

    /// A copy marked stale as of `now` (used by invalidation).
    pub fn marked_stale(&self, now: Instant) -> Self {
        let mut copy = self.clone();
        copy.stale_at = Some(now);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_entry_is_fresh_until_stale_at() {
        let now = Instant::now();
        let entry = CacheEntry::success(
            Arc::new(json!({"total": 1})),
            now,
            Duration::from_secs(5),
            false,
        );

        assert!(entry.is_fresh(now));
        assert!(entry.is_fresh(now + Duration::from_secs(3)));
        assert!(!entry.is_fresh(now + Duration::from_secs(5)));
        assert!(entry.stale_at >= entry.fetched_at);
    }

    #[test]
    fn loading_carries_previous_data() {
        let now = Instant::now();
        let success = CacheEntry::success(
            Arc::new(json!({"total": 1})),
            now,
            Duration::from_secs(5),
            false,
        );
        let loading = CacheEntry::loading_from(Some(&success));

        assert_eq!(loading.status, QueryStatus::Loading);
        assert!(loading.data.is_some());
        assert!(!loading.is_fresh(now), "loading is never fresh");
    }

    #[test]
    fn marked_stale_fails_freshness_immediately() {
        let now = Instant::now();
        let entry = CacheEntry::success(
            Arc::new(json!(null)),
            now,
            Duration::from_secs(60),
            false,
        );
        assert!(!entry.marked_stale(now).is_fresh(now));
    }

    #[test]
    fn idle_and_error_are_never_fresh() {
        let now = Instant::now();
        assert!(!CacheEntry::idle().is_fresh(now));

        let failed = CacheEntry::failure(
            Arc::new(crate::error::CoreError::Internal("boom".into())),
            None,
        );
        assert!(!failed.is_fresh(now));
    }
}
