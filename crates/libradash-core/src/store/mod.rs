// ── Cache store ──
//
// Thread-safe storage for all cached query results, keyed by the
// canonical form of the QueryKey. Entries are replaced wholesale and
// every replacement is broadcast to subscribers via `watch` channels.

mod entry;

pub use entry::{CacheEntry, QueryStatus};

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::key::QueryKey;

/// One cache slot: the entry channel plus subscription bookkeeping.
///
/// The subscriber counter lives on the slot, not inside the entry, so
/// that counting never violates wholesale entry replacement.
pub(crate) struct Slot {
    key: QueryKey,
    entry: watch::Sender<Arc<CacheEntry>>,
    subscribers: AtomicI64,
    /// When the last subscriber detached (or the slot was created
    /// unsubscribed). `None` while at least one subscriber is attached.
    idle_since: ArcSwapOption<Instant>,
}

/// In-memory map from canonical QueryKey to cache slot.
///
/// All reads return `Arc<CacheEntry>` snapshots; writers publish whole
/// replacement entries through the slot's `watch` channel.
pub struct CacheStore {
    slots: DashMap<String, Arc<Slot>>,
    last_write: watch::Sender<Option<DateTime<Utc>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        let (last_write, _) = watch::channel(None);
        Self {
            slots: DashMap::new(),
            last_write,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Snapshot of the current entry, if the key is cached.
    pub fn get(&self, key: &QueryKey) -> Option<Arc<CacheEntry>> {
        self.slot(key).map(|s| s.entry.borrow().clone())
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.slot(key)
            .map_or(0, |s| {
                usize::try_from(s.subscribers.load(Ordering::SeqCst).max(0)).unwrap_or(0)
            })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All currently cached keys.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.slots.iter().map(|r| r.value().key.clone()).collect()
    }

    /// Wall-clock time of the last write, for diagnostics.
    pub fn last_write(&self) -> Option<DateTime<Utc>> {
        *self.last_write.borrow()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace the entry under `key`, creating the slot if missing.
    pub fn set(&self, key: &QueryKey, entry: CacheEntry) {
        let slot = self.slot_or_insert(key);
        Self::publish(&slot, entry);
        self.touch();
    }

    /// Check-before-commit write: replaces the entry only if the slot
    /// still exists. Returns `false` when the result arrived after the
    /// slot was garbage collected -- the late write is discarded.
    pub fn commit(&self, key: &QueryKey, entry: CacheEntry) -> bool {
        match self.slot(key) {
            Some(slot) => {
                Self::publish(&slot, entry);
                self.touch();
                true
            }
            None => {
                debug!(%key, "late result discarded; entry was garbage collected");
                false
            }
        }
    }

    /// Remove a slot entirely, returning the final entry snapshot.
    pub fn delete(&self, key: &QueryKey) -> Option<Arc<CacheEntry>> {
        let removed = self
            .slots
            .remove(key.canonical())
            .map(|(_, slot)| slot.entry.borrow().clone());
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Mark the entry stale as of `now`, forcing the next read to
    /// refetch. Returns `false` if the key is not cached.
    pub fn invalidate(&self, key: &QueryKey, now: Instant) -> bool {
        match self.slot(key) {
            Some(slot) => {
                let stale = slot.entry.borrow().marked_stale(now);
                Self::publish(&slot, stale);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Mark every cached key with the given segment prefix stale.
    /// Returns the number of entries invalidated.
    pub fn invalidate_prefix(&self, prefix: &QueryKey, now: Instant) -> usize {
        let matching: Vec<QueryKey> = self
            .slots
            .iter()
            .filter(|r| r.value().key.starts_with(prefix))
            .map(|r| r.value().key.clone())
            .collect();
        let mut count = 0;
        for key in &matching {
            if self.invalidate(key, now) {
                count += 1;
            }
        }
        count
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Bind a consumer's lifetime to a key. The returned guard
    /// decrements the subscriber count when dropped.
    pub fn subscribe(&self, key: &QueryKey) -> Subscription {
        let slot = self.slot_or_insert(key);
        slot.subscribers.fetch_add(1, Ordering::SeqCst);
        slot.idle_since.store(None);
        Subscription { slot }
    }

    /// Change notification channel for a key. Creates the slot if
    /// missing so a consumer can watch before the first fetch.
    pub fn watch(&self, key: &QueryKey) -> watch::Receiver<Arc<CacheEntry>> {
        self.slot_or_insert(key).entry.subscribe()
    }

    // ── Garbage collection ───────────────────────────────────────────

    /// Remove every slot that has had zero subscribers for at least
    /// `cache_time`. Returns the number of slots removed.
    pub fn sweep(&self, now: Instant, cache_time: Duration) -> usize {
        // Counted in the closure; concurrent inserts make a
        // before/after length comparison unreliable.
        let mut removed = 0;
        self.slots.retain(|_, slot| {
            if slot.subscribers.load(Ordering::SeqCst) > 0 {
                return true;
            }
            match slot.idle_since.load().as_deref() {
                Some(idle) if now.saturating_duration_since(*idle) >= cache_time => {
                    removed += 1;
                    false
                }
                Some(_) => true,
                // Unsubscribed but never stamped: keep, stamp now.
                None => {
                    slot.idle_since.store(Some(Arc::new(now)));
                    true
                }
            }
        });
        if removed > 0 {
            debug!(removed, "cache sweep complete");
        }
        removed
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn slot(&self, key: &QueryKey) -> Option<Arc<Slot>> {
        self.slots.get(key.canonical()).map(|r| Arc::clone(r.value()))
    }

    fn slot_or_insert(&self, key: &QueryKey) -> Arc<Slot> {
        Arc::clone(
            self.slots
                .entry(key.canonical().to_owned())
                .or_insert_with(|| {
                    let (entry, _) = watch::channel(Arc::new(CacheEntry::idle()));
                    Arc::new(Slot {
                        key: key.clone(),
                        entry,
                        subscribers: AtomicI64::new(0),
                        idle_since: ArcSwapOption::from_pointee(Instant::now()),
                    })
                })
                .value(),
        )
    }

    fn publish(slot: &Slot, entry: CacheEntry) {
        // `send_modify` updates unconditionally, even with zero receivers.
        slot.entry.send_modify(|e| *e = Arc::new(entry));
    }

    fn touch(&self) {
        let _ = self.last_write.send(Some(Utc::now()));
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle binding a subscriber to a cache slot.
///
/// Dropping it decrements the slot's subscriber count; when the last
/// subscriber detaches, the slot becomes eligible for garbage
/// collection after the configured cache time.
pub struct Subscription {
    slot: Arc<Slot>,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.slot.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let prev = self.slot.subscribers.fetch_sub(1, Ordering::SeqCst);
        if prev <= 0 {
            // Programmer error: more drops than subscriptions.
            error!(key = %self.slot.key, "cache consistency violation: subscriber count underflow");
            debug_assert!(prev > 0, "subscriber count underflow");
            self.slot.subscribers.fetch_add(1, Ordering::SeqCst);
        } else if prev == 1 {
            self.slot
                .idle_since
                .store(Some(Arc::new(Instant::now())));
        }
    }
}
