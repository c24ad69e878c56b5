//! Bounded ledger of already-handled posts.
//!
//! Two identities may each deliver an event for the same underlying post,
//! and a crashed flush may be retried; the ledger makes the second sighting
//! a no-op. Entries are only committed once a forward attempt succeeded (or
//! decimation decided to skip), so a failed delivery can still be retried by
//! a later re-delivery of the raw event.

use std::{
    collections::{HashSet, VecDeque},
    sync::Mutex,
};

use courier_common::DedupKey;

/// Ledger ceiling; the oldest half is dropped when it is exceeded.
pub const DEDUP_CAPACITY: usize = 10_000;

pub struct DedupLedger {
    inner: Mutex<Inner>,
    capacity: usize,
}

#[derive(Default)]
struct Inner {
    seen: HashSet<DedupKey>,
    /// Insertion order of `seen`, for approximate-recency eviction.
    order: VecDeque<DedupKey>,
    /// Keys currently being forwarded; duplicates arriving mid-attempt are
    /// dropped without waiting for the outcome.
    inflight: HashSet<DedupKey>,
}

impl DedupLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEDUP_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(2),
        }
    }

    /// Whether the key was already handled or is being handled right now.
    pub fn is_duplicate(&self, key: &DedupKey) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.seen.contains(key) || inner.inflight.contains(key)
    }

    /// Claim a key for forwarding. Returns false if it is a duplicate; on
    /// true the caller must finish with [`commit`](Self::commit) or
    /// [`release`](Self::release).
    pub fn reserve(&self, key: &DedupKey) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.seen.contains(key) || inner.inflight.contains(key) {
            return false;
        }
        inner.inflight.insert(key.clone());
        true
    }

    /// Record a reserved key as handled.
    pub fn commit(&self, key: &DedupKey) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.inflight.remove(key);
        Self::insert_seen(&mut inner, self.capacity, key);
    }

    /// Drop a reservation without recording the key, so a later re-delivery
    /// can retry the forward.
    pub fn release(&self, key: &DedupKey) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.inflight.remove(key);
    }

    /// Record a key as handled without a prior reservation (album path).
    pub fn mark_seen(&self, key: &DedupKey) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.inflight.remove(key);
        Self::insert_seen(&mut inner, self.capacity, key);
    }

    fn insert_seen(inner: &mut Inner, capacity: usize, key: &DedupKey) {
        if !inner.seen.insert(key.clone()) {
            return;
        }
        inner.order.push_back(key.clone());
        if inner.order.len() > capacity {
            // Approximate recency: discard the oldest half wholesale.
            for _ in 0..inner.order.len() / 2 {
                if let Some(old) = inner.order.pop_front() {
                    inner.seen.remove(&old);
                }
            }
        }
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new()
    }
}
