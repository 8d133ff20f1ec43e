// ── Query executor ──
//
// Single-flight request coalescing, staleness checks, and retries on
// top of the CacheStore. Invariant: at most one fetch in flight per
// canonical key; every concurrent caller awaits the same outcome.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Fetched, FetchSource, Fetcher, QueryOptions, QuerySpec};
use crate::error::CoreError;
use crate::key::QueryKey;
use crate::store::{CacheEntry, CacheStore};

type FetchOutcome = Result<Arc<Value>, Arc<CoreError>>;
type FlightMap = Arc<DashMap<String, watch::Receiver<Option<FetchOutcome>>>>;

/// Performs fetches against the cache with coalescing and retries.
pub struct QueryExecutor {
    store: Arc<CacheStore>,
    inflight: FlightMap,
}

/// The leader's claim on a key's in-flight slot.
///
/// Dropping without publishing (leader cancelled mid-fetch) releases
/// the slot so a follower can claim leadership on its next loop turn.
struct Flight {
    map: FlightMap,
    canonical: String,
    tx: watch::Sender<Option<FetchOutcome>>,
}

impl Flight {
    /// Release the slot, then wake all followers with the outcome.
    /// Ordering matters: the store commit has already happened, so a
    /// caller arriving between removal and wakeup sees the fresh entry.
    fn publish(&self, outcome: FetchOutcome) {
        self.map.remove(&self.canonical);
        let _ = self.tx.send(Some(outcome));
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        // After publish the slot may already belong to a newer flight;
        // only ever remove our own registration.
        let own = self.tx.subscribe();
        self.map
            .remove_if(&self.canonical, |_, rx| rx.same_channel(&own));
    }
}

enum Role {
    Lead(Flight),
    Join(watch::Receiver<Option<FetchOutcome>>),
}

impl QueryExecutor {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Resolve a query against the cache, fetching if missing or stale.
    pub async fn execute(
        &self,
        spec: &QuerySpec,
        fetcher: &Arc<dyn Fetcher>,
        options: &QueryOptions,
    ) -> Arc<CacheEntry> {
        self.run(spec, fetcher, options, false).await
    }

    /// Manual refetch: bypasses the freshness check but still coalesces
    /// with any fetch already in flight.
    pub async fn execute_force(
        &self,
        spec: &QuerySpec,
        fetcher: &Arc<dyn Fetcher>,
        options: &QueryOptions,
    ) -> Arc<CacheEntry> {
        self.run(spec, fetcher, options, true).await
    }

    async fn run(
        &self,
        spec: &QuerySpec,
        fetcher: &Arc<dyn Fetcher>,
        options: &QueryOptions,
        force: bool,
    ) -> Arc<CacheEntry> {
        let QuerySpec::Active(key) = spec else {
            // Disabled queries perform no I/O and touch no cache state.
            return Arc::new(CacheEntry::idle());
        };

        loop {
            if !force {
                if let Some(entry) = self.store.get(key) {
                    if entry.is_fresh(Instant::now()) {
                        return entry;
                    }
                }
            }

            match self.join_or_lead(key) {
                Role::Lead(flight) => {
                    return self.lead(&flight, key, fetcher, options).await;
                }
                Role::Join(mut rx) => {
                    match rx.wait_for(Option::is_some).await {
                        Ok(published) => {
                            let outcome = (*published).clone();
                            drop(published);
                            if let Some(outcome) = outcome {
                                return self.snapshot_for(key, outcome, options);
                            }
                        }
                        // Leader was cancelled before publishing; take
                        // another turn (and possibly the lead).
                        Err(_) => {}
                    }
                }
            }
        }
    }

    /// Atomically claim or join the per-key in-flight slot.
    fn join_or_lead(&self, key: &QueryKey) -> Role {
        match self.inflight.entry(key.canonical().to_owned()) {
            Entry::Occupied(slot) => Role::Join(slot.get().clone()),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx);
                Role::Lead(Flight {
                    map: Arc::clone(&self.inflight),
                    canonical: key.canonical().to_owned(),
                    tx,
                })
            }
        }
    }

    /// Run the fetch-and-retry loop as the flight leader.
    async fn lead(
        &self,
        flight: &Flight,
        key: &QueryKey,
        fetcher: &Arc<dyn Fetcher>,
        options: &QueryOptions,
    ) -> Arc<CacheEntry> {
        let prev = self.store.get(key);
        self.store
            .set(key, CacheEntry::loading_from(prev.as_deref()));

        // Intermediate retry attempts keep the entry in Loading; only
        // exhaustion commits an Error.
        let mut attempt = 0u32;
        let outcome = loop {
            attempt += 1;
            match fetcher.fetch(key).await {
                Ok(fetched) => break Ok(fetched),
                Err(err) => {
                    if options.retry.should_retry(&err, attempt) {
                        let delay = options.retry.delay_for(attempt);
                        debug!(%key, attempt, ?delay, error = %err, "transient fetch failure; retrying");
                        tokio::time::sleep(delay).await;
                    } else {
                        break Err(Arc::new(err));
                    }
                }
            }
        };

        let now = Instant::now();
        let (entry, published): (CacheEntry, FetchOutcome) = match outcome {
            Ok(Fetched { value, source }) => {
                let value = Arc::new(value);
                let via_fallback = source == FetchSource::Fallback;
                if via_fallback {
                    warn!(%key, "committing deterministic fallback data; live backend unreachable");
                }
                (
                    CacheEntry::success(Arc::clone(&value), now, options.stale_time, via_fallback),
                    Ok(value),
                )
            }
            Err(err) => (
                CacheEntry::failure(Arc::clone(&err), prev.as_deref()),
                Err(err),
            ),
        };

        let snapshot = Arc::new(entry.clone());
        self.store.commit(key, entry);
        flight.publish(published);
        snapshot
    }

    /// Snapshot returned to a follower once the leader publishes.
    fn snapshot_for(
        &self,
        key: &QueryKey,
        outcome: FetchOutcome,
        options: &QueryOptions,
    ) -> Arc<CacheEntry> {
        if let Some(entry) = self.store.get(key) {
            // The leader commits before publishing, so this reflects
            // the awaited outcome (or something even newer).
            return entry;
        }
        // Slot was garbage collected mid-flight; hand the caller a
        // detached snapshot of the outcome it awaited.
        let now = Instant::now();
        Arc::new(match outcome {
            Ok(value) => CacheEntry::success(value, now, options.stale_time, false),
            Err(err) => CacheEntry::failure(err, None),
        })
    }
}
