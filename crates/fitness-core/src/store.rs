//! Addressable store: the latest-observed-event map keyed by
//! `(pubkey, kind, d_tag)` (spec §4.F).
//!
//! Single-writer/multi-reader: the pool's demux task is the only writer,
//! every other task reads a lock-free snapshot. Persistence to an external
//! key/value cache is coalesced onto a 1s interval rather than written
//! synchronously on every update, the same background-flush shape as the
//! teacher's `gossipd::storage` tree writes.

use nostr_wire::{Coordinate, Event};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The external persistence seam (spec §6 "Persisted state layout").
/// Keys and values are opaque bytes; this crate owns the key layout.
pub trait KvCache: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&self, key: &str, value: &[u8]);
    fn delete(&self, key: &str);
}

/// A `sled`-backed [`KvCache`] for local/dev use.
pub struct SledCache {
    tree: sled::Tree,
}

impl SledCache {
    pub fn open(path: impl AsRef<std::path::Path>) -> sled::Result<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree("addressable")?;
        Ok(Self { tree })
    }
}

impl KvCache for SledCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.tree.get(key).ok().flatten().map(|v| v.to_vec())
    }

    fn put(&self, key: &str, value: &[u8]) {
        if let Err(e) = self.tree.insert(key, value) {
            warn!(%key, error = %e, "sled cache write failed");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.tree.remove(key) {
            warn!(%key, error = %e, "sled cache delete failed");
        }
    }
}

fn cache_key(coord: &Coordinate) -> String {
    format!("addressable/{}/{}/{}", coord.pubkey.to_hex(), coord.kind.0, coord.d_tag)
}

/// The in-memory `(pubkey, kind, d_tag) -> latest event` map (spec §3
/// "Addressable coordinate", §4.F).
pub struct AddressableStore {
    entries: RwLock<HashMap<Coordinate, Event>>,
    cache: Option<Arc<dyn KvCache>>,
    dirty: AtomicBool,
}

impl AddressableStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cache: None,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn with_cache(cache: Arc<dyn KvCache>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cache: Some(cache),
            dirty: AtomicBool::new(false),
        }
    }

    /// Preload every addressable entry the cache already holds, for warm
    /// reads after a restart. Only meaningful with [`AddressableStore::with_cache`];
    /// the caller supplies the coordinates it expects to find, since the
    /// `KvCache` trait does not expose a key-scan operation.
    pub fn preload(&self, coords: &[Coordinate]) {
        let Some(cache) = &self.cache else { return };
        let mut entries = self.entries.write();
        for coord in coords {
            if let Some(bytes) = cache.get(&cache_key(coord)) {
                if let Ok(event) = serde_json::from_slice::<Event>(&bytes) {
                    entries.insert(coord.clone(), event);
                }
            }
        }
    }

    /// Offer an incoming event to the store. Applies the supersede rule:
    /// newer `created_at` wins; on a tie, the lexicographically smaller
    /// `id` wins. Returns `true` if the event replaced the stored one (or
    /// there was none).
    pub fn observe(&self, event: Event) -> bool {
        let Some(coord) = event.coordinate() else {
            return false;
        };
        let mut entries = self.entries.write();
        let replace = match entries.get(&coord) {
            None => true,
            Some(current) => {
                event.created_at > current.created_at
                    || (event.created_at == current.created_at && event.id < current.id)
            }
        };
        if replace {
            debug!(coordinate = ?coord, "addressable store entry updated");
            entries.insert(coord, event);
            self.dirty.store(true, Ordering::Relaxed);
        }
        replace
    }

    pub fn get(&self, coord: &Coordinate) -> Option<Event> {
        self.entries.read().get(coord).cloned()
    }

    /// A point-in-time clone of every stored event, for callers that need
    /// to filter by something other than the exact coordinate (e.g. a
    /// `"team"` tag value).
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every entry to the cache if anything changed since the last
    /// flush. Intended to run off a `tokio::time::interval(1s)` background
    /// task (spec §4.F "1 s coalesced write").
    pub fn flush(&self) {
        let Some(cache) = &self.cache else { return };
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return;
        }
        let snapshot: Vec<(Coordinate, Event)> =
            self.entries.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (coord, event) in snapshot {
            match serde_json::to_vec(&event) {
                Ok(bytes) => cache.put(&cache_key(&coord), &bytes),
                Err(e) => warn!(coordinate = ?coord, error = %e, "failed to serialize for cache flush"),
            }
        }
    }

    /// Spawn the 1s coalesced flush loop. Dropping the returned handle
    /// does not stop the task; abort it explicitly if needed.
    pub fn spawn_flush_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                store.flush();
            }
        })
    }
}

impl Default for AddressableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_wire::{Kind, KeyPair, EventBuilder, Tag};

    fn event_at(kp: &KeyPair, created_at: u64, content: &str) -> Event {
        EventBuilder::new(Kind::TEAM_DEFINITION)
            .tag(Tag::d("alpha"))
            .content(content)
            .created_at(created_at)
            .build(kp)
            .unwrap()
    }

    #[test]
    fn newer_created_at_supersedes_older() {
        let kp = KeyPair::generate();
        let store = AddressableStore::new();
        assert!(store.observe(event_at(&kp, 100, "first")));
        assert!(store.observe(event_at(&kp, 200, "second")));
        let coord = Coordinate::new(kp.public_key(), Kind::TEAM_DEFINITION, "alpha");
        assert_eq!(store.get(&coord).unwrap().content, "second");
    }

    #[test]
    fn older_created_at_is_rejected() {
        let kp = KeyPair::generate();
        let store = AddressableStore::new();
        assert!(store.observe(event_at(&kp, 200, "second")));
        assert!(!store.observe(event_at(&kp, 100, "first")));
        let coord = Coordinate::new(kp.public_key(), Kind::TEAM_DEFINITION, "alpha");
        assert_eq!(store.get(&coord).unwrap().content, "second");
    }

    #[test]
    fn tie_breaks_on_smaller_id() {
        let kp = KeyPair::generate();
        let store = AddressableStore::new();
        let a = event_at(&kp, 100, "a");
        let b = event_at(&kp, 100, "b");
        let (smaller, larger) = if a.id < b.id { (a, b) } else { (b, a) };

        store.observe(larger.clone());
        store.observe(smaller.clone());
        let coord = Coordinate::new(kp.public_key(), Kind::TEAM_DEFINITION, "alpha");
        assert_eq!(store.get(&coord).unwrap().id, smaller.id);
    }

    #[test]
    fn non_addressable_event_is_ignored() {
        let kp = KeyPair::generate();
        let store = AddressableStore::new();
        let event = EventBuilder::new(Kind::WORKOUT_RECORD)
            .content("ran")
            .build(&kp)
            .unwrap();
        assert!(!store.observe(event));
        assert!(store.is_empty());
    }

    #[test]
    fn flush_round_trips_through_sled() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SledCache::open(dir.path()).unwrap());
        let kp = KeyPair::generate();
        let store = Arc::new(AddressableStore::with_cache(cache.clone()));
        store.observe(event_at(&kp, 100, "first"));
        store.flush();

        let coord = Coordinate::new(kp.public_key(), Kind::TEAM_DEFINITION, "alpha");
        let bytes = cache.get(&cache_key(&coord)).unwrap();
        let event: Event = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(event.content, "first");
    }
}
