//! src/store.rs
//! EphemeralStore – współdzielony wzorzec "mapa w pamięci + eviction po TTL".
//!
//! Na nim stoją oba trackery (InviteAttributor, SpamScorer). DashMap daje
//! blokady per shard, więc operacje na różnych kluczach się nie blokują,
//! a `entry()` daje atomowe get-or-create-and-update dla jednego klucza.

use std::borrow::Borrow;
use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::one::RefMut;

/// Wpis, który wie, kiedy był ostatnio dotknięty.
pub trait Stamped {
    fn last_touch(&self) -> Instant;
}

#[inline]
fn is_stale(last: Instant, now: Instant, horizon: Duration) -> bool {
    now.saturating_duration_since(last) > horizon
}

#[derive(Debug)]
pub struct EphemeralStore<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V>,
}

impl<K, V> Default for EphemeralStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Stamped,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EphemeralStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Stamped,
{
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    /// Wpis pod blokadą shardu; tworzony leniwie przez `init`.
    /// Trzymaj krótko – guard blokuje shard dla zapisów.
    pub fn entry_or_insert_with(&self, key: K, init: impl FnOnce() -> V) -> RefMut<'_, K, V> {
        self.map.entry(key).or_insert_with(init)
    }

    /// Mutacja istniejącego wpisu (bez tworzenia).
    pub fn get_mut<Q>(&self, key: &Q) -> Option<RefMut<'_, K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get_mut(key)
    }

    pub fn insert(&self, key: K, value: V) {
        self.map.insert(key, value);
    }

    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key).is_some()
    }

    pub fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.map.get(key).map(|e| e.value().clone())
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Usuwa wpisy starsze niż `now - horizon`. Zwraca liczbę usuniętych.
    ///
    /// Dwie fazy: najpierw skan kandydatów shard po shardzie (read guard na
    /// czas przejścia jednego shardu), potem każdy klucz usuwamy osobno przez
    /// `remove_if`, który ponownie sprawdza znacznik czasu pod blokadą.
    /// Wpis odświeżony w międzyczasie zostaje.
    pub fn evict_older_than(&self, now: Instant, horizon: Duration) -> usize {
        let candidates: Vec<K> = self
            .map
            .iter()
            .filter(|e| is_stale(e.value().last_touch(), now, horizon))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in candidates {
            if self
                .map
                .remove_if(&key, |_, v| is_stale(v.last_touch(), now, horizon))
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Entry(Instant);

    impl Stamped for Entry {
        fn last_touch(&self) -> Instant {
            self.0
        }
    }

    #[test]
    fn evicts_only_stale_entries() {
        let store: EphemeralStore<u64, Entry> = EphemeralStore::new();
        let t0 = Instant::now();
        store.insert(1, Entry(t0));
        store.insert(2, Entry(t0 + Duration::from_secs(50)));

        let removed = store.evict_older_than(t0 + Duration::from_secs(60), Duration::from_secs(30));
        assert_eq!(removed, 1);
        assert!(!store.contains(&1));
        assert!(store.contains(&2));
    }

    #[test]
    fn entry_exactly_at_horizon_survives() {
        let store: EphemeralStore<u64, Entry> = EphemeralStore::new();
        let t0 = Instant::now();
        store.insert(1, Entry(t0));
        let removed = store.evict_older_than(t0 + Duration::from_secs(30), Duration::from_secs(30));
        assert_eq!(removed, 0);
    }

    #[test]
    fn future_timestamps_are_not_stale() {
        // saturating_duration_since -> 0
        let store: EphemeralStore<u64, Entry> = EphemeralStore::new();
        let t0 = Instant::now();
        store.insert(7, Entry(t0 + Duration::from_secs(3600)));
        assert_eq!(store.evict_older_than(t0, Duration::ZERO), 0);
    }

    #[test]
    fn string_keys_are_looked_up_by_str() {
        let store: EphemeralStore<String, Entry> = EphemeralStore::new();
        store.insert("abc".to_string(), Entry(Instant::now()));
        assert!(store.contains("abc"));
        assert!(store.get_cloned("abc").is_some());
        assert!(store.get_mut("abc").is_some());
        assert!(store.remove("abc"));
        assert!(!store.contains("abc"));
    }
}
