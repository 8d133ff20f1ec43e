// ── Mutation coordinator ──
//
// Executes writes and applies cache effects on success only. A failed
// mutation performs zero cache side effects -- no invalidation, no
// write-through -- so the UI can never show the result of an action
// that did not happen.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::CoreError;
use crate::key::QueryKey;
use crate::store::{CacheEntry, CacheStore};

/// Mutation lifecycle, tracked per handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MutationStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Observable state of one mutation.
#[derive(Debug, Clone)]
pub struct MutationSnapshot {
    pub status: MutationStatus,
    pub data: Option<Arc<Value>>,
    pub error: Option<Arc<CoreError>>,
}

impl MutationSnapshot {
    fn idle() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
        }
    }
}

pub type WriteThroughFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Derive a cache entry for `key` from the mutation result instead of
/// waiting for a refetch.
#[derive(Clone)]
pub struct WriteThrough {
    pub key: QueryKey,
    pub apply: WriteThroughFn,
}

/// Declared cache effects of a successful mutation.
#[derive(Clone)]
pub struct MutationOptions {
    /// Keys marked stale on success (exact-key match).
    pub invalidate: Vec<QueryKey>,
    /// Entries overwritten with derived data on success.
    pub write_through: Vec<WriteThrough>,
    /// Staleness window for write-through entries.
    pub stale_time: Duration,
}

impl MutationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(mut self, key: QueryKey) -> Self {
        self.invalidate.push(key);
        self
    }

    pub fn write_through(mut self, key: QueryKey, apply: WriteThroughFn) -> Self {
        self.write_through.push(WriteThrough { key, apply });
        self
    }
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            invalidate: Vec::new(),
            write_through: Vec::new(),
            stale_time: Duration::from_secs(30),
        }
    }
}

/// Creates mutation handles bound to the cache store.
pub struct MutationCoordinator {
    store: Arc<CacheStore>,
}

impl MutationCoordinator {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    pub fn mutation(&self, options: MutationOptions) -> Mutation {
        let (state, _) = watch::channel(MutationSnapshot::idle());
        Mutation {
            id: Uuid::new_v4(),
            store: Arc::clone(&self.store),
            options,
            state,
        }
    }
}

/// One logical mutation: run it, observe it, get the result back as a
/// value (no success/error callbacks -- ordering is unambiguous).
pub struct Mutation {
    id: Uuid,
    store: Arc<CacheStore>,
    options: MutationOptions,
    state: watch::Sender<MutationSnapshot>,
}

impl Mutation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> MutationSnapshot {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MutationSnapshot> {
        self.state.subscribe()
    }

    /// Execute the mutation. On success, cache effects (write-through,
    /// then invalidation) are applied before this returns, so the
    /// awaiting caller always observes an already-invalidated cache.
    pub async fn run<V, F, Fut>(&self, variables: V, op: F) -> Result<Arc<Value>, Arc<CoreError>>
    where
        F: FnOnce(V) -> Fut,
        Fut: Future<Output = Result<Value, CoreError>>,
    {
        self.publish(MutationSnapshot {
            status: MutationStatus::Loading,
            data: None,
            error: None,
        });

        match op(variables).await {
            Ok(value) => {
                let value = Arc::new(value);
                self.apply_success_effects(&value);
                info!(id = %self.id, "mutation succeeded");
                self.publish(MutationSnapshot {
                    status: MutationStatus::Success,
                    data: Some(Arc::clone(&value)),
                    error: None,
                });
                Ok(value)
            }
            Err(err) => {
                let err = Arc::new(err);
                debug!(id = %self.id, error = %err, "mutation failed; cache untouched");
                self.publish(MutationSnapshot {
                    status: MutationStatus::Error,
                    data: None,
                    error: Some(Arc::clone(&err)),
                });
                Err(err)
            }
        }
    }

    fn apply_success_effects(&self, result: &Arc<Value>) {
        let now = Instant::now();

        for wt in &self.options.write_through {
            let derived = (wt.apply)(result);
            self.store.set(
                &wt.key,
                CacheEntry::success(Arc::new(derived), now, self.options.stale_time, false),
            );
        }

        for key in &self.options.invalidate {
            // Write-through already produced fresh data for these keys;
            // marking them stale again would force a pointless refetch.
            if self.options.write_through.iter().any(|wt| wt.key == *key) {
                continue;
            }
            self.store.invalidate(key, now);
        }
    }

    fn publish(&self, snapshot: MutationSnapshot) {
        self.state.send_modify(|s| *s = snapshot);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::QueryStatus;
    use serde_json::json;

    fn seeded_store(keys: &[&QueryKey]) -> Arc<CacheStore> {
        let store = Arc::new(CacheStore::new());
        for key in keys {
            store.set(
                key,
                CacheEntry::success(
                    Arc::new(json!({"seed": key.canonical()})),
                    Instant::now(),
                    Duration::from_secs(60),
                    false,
                ),
            );
        }
        store
    }

    #[tokio::test]
    async fn failed_mutation_leaves_cache_untouched() {
        let libraries = QueryKey::named("libraries");
        let store = seeded_store(&[&libraries]);
        let coordinator = MutationCoordinator::new(Arc::clone(&store));

        let before = store.get(&libraries).unwrap();

        let mutation = coordinator.mutation(
            MutationOptions::new().invalidate(libraries.clone()),
        );
        let result = mutation
            .run(json!({"name": "x"}), |_vars| async {
                Err(CoreError::Http {
                    status: 500,
                    message: "boom".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(mutation.snapshot().status, MutationStatus::Error);

        // Same Arc: the entry was not even replaced, let alone changed.
        let after = store.get(&libraries).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(after.is_fresh(Instant::now()));
    }

    #[tokio::test]
    async fn successful_mutation_invalidates_declared_keys() {
        let libraries = QueryKey::named("libraries");
        let untouched = QueryKey::named("setupStatus");
        let store = seeded_store(&[&libraries, &untouched]);
        let coordinator = MutationCoordinator::new(Arc::clone(&store));

        let mutation = coordinator.mutation(
            MutationOptions::new().invalidate(libraries.clone()),
        );
        let result = mutation
            .run(json!({}), |_vars| async { Ok(json!({"ok": true})) })
            .await
            .unwrap();

        assert_eq!(*result, json!({"ok": true}));
        assert_eq!(mutation.snapshot().status, MutationStatus::Success);

        let now = Instant::now();
        assert!(!store.get(&libraries).unwrap().is_fresh(now));
        assert!(store.get(&untouched).unwrap().is_fresh(now));
    }

    #[tokio::test]
    async fn write_through_overwrites_instead_of_invalidating() {
        let detail = QueryKey::named("library-detail");
        let store = seeded_store(&[&detail]);
        let coordinator = MutationCoordinator::new(Arc::clone(&store));

        let mutation = coordinator.mutation(
            MutationOptions::new()
                .invalidate(detail.clone())
                .write_through(
                    detail.clone(),
                    Arc::new(|result| json!({"saved": result.clone()})),
                ),
        );
        mutation
            .run(json!({}), |_vars| async { Ok(json!({"id": "nyc-001"})) })
            .await
            .unwrap();

        let entry = store.get(&detail).unwrap();
        assert_eq!(entry.status, QueryStatus::Success);
        assert_eq!(
            entry.data.as_deref(),
            Some(&json!({"saved": {"id": "nyc-001"}}))
        );
        // Overwritten with fresh derived data, not marked stale.
        assert!(entry.is_fresh(Instant::now()));
    }

    #[tokio::test]
    async fn effects_are_visible_before_run_returns() {
        let libraries = QueryKey::named("libraries");
        let store = seeded_store(&[&libraries]);
        let coordinator = MutationCoordinator::new(Arc::clone(&store));

        coordinator
            .mutation(MutationOptions::new().invalidate(libraries.clone()))
            .run(json!({}), |_vars| async { Ok(json!(null)) })
            .await
            .unwrap();

        // Code running after the await observes the invalidation.
        assert!(!store.get(&libraries).unwrap().is_fresh(Instant::now()));
    }

    #[tokio::test]
    async fn snapshot_tracks_lifecycle() {
        let store = Arc::new(CacheStore::new());
        let coordinator = MutationCoordinator::new(store);
        let mutation = coordinator.mutation(MutationOptions::new());

        assert_eq!(mutation.snapshot().status, MutationStatus::Idle);
        mutation
            .run(json!({}), |_vars| async { Ok(json!(1)) })
            .await
            .unwrap();
        let snapshot = mutation.snapshot();
        assert_eq!(snapshot.status, MutationStatus::Success);
        assert_eq!(snapshot.data.as_deref(), Some(&json!(1)));
    }
}
