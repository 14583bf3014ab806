//! src/spam.rs
//! SpamScorer – krocząca punktacja wiadomości per (user, guild).
//!
//! - liniowy decay punktów w oknie `decay_window_secs`
//! - bufor ostatnich N fingerprintów (FIFO), powtórka = kara `repeat_penalty`
//! - wynik: aktualna suma + flaga "powyżej progu"
//!
//! Jaką karę dać – to już decyzja warstwy moderacji, nie tego modułu.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::SpamConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::fingerprint::Fingerprint;
use crate::store::{EphemeralStore, Stamped};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpamKey {
    pub user_id: u64,
    pub guild_id: u64,
}

impl SpamKey {
    pub fn new(user_id: u64, guild_id: u64) -> TrackerResult<Self> {
        if user_id == 0 || guild_id == 0 {
            return Err(TrackerError::InvalidArgument("user_id and guild_id must be non-zero"));
        }
        Ok(Self { user_id, guild_id })
    }
}

#[derive(Debug, Clone)]
pub struct SpamTracker {
    pub point_total: u64,
    pub message_cache: VecDeque<Fingerprint>,
    pub last_update: Instant,
}

impl Stamped for SpamTracker {
    fn last_touch(&self) -> Instant {
        self.last_update
    }
}

impl SpamTracker {
    fn new(now: Instant, capacity: usize) -> Self {
        Self {
            point_total: 0,
            message_cache: VecDeque::with_capacity(capacity),
            last_update: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamVerdict {
    pub point_total: u64,
    pub over_threshold: bool,
    /// Fingerprint był już w buforze (naliczono karę za powtórkę).
    pub repeated: bool,
}

/// Liniowy decay: `total * (window - elapsed) / window`, w dół.
/// `elapsed >= window` => 0. Nigdy więcej niż `total`.
pub fn decay_points(total: u64, elapsed: Duration, window: Duration) -> u64 {
    if window.is_zero() || elapsed >= window {
        return 0;
    }
    let window_ns = window.as_nanos();
    let remaining_ns = window_ns - elapsed.as_nanos();
    match (total as u128).checked_mul(remaining_ns) {
        Some(p) => (p / window_ns) as u64,
        // okna rzędu lat + ogromne sumy: liczymy na ułamku (rzutowanie f64 -> u64 saturuje)
        None => {
            let ratio = remaining_ns as f64 / window_ns as f64;
            ((total as f64 * ratio) as u64).min(total)
        }
    }
}

#[derive(Debug)]
pub struct SpamScorer {
    cfg: SpamConfig,
    trackers: EphemeralStore<SpamKey, SpamTracker>,
}

impl SpamScorer {
    pub fn new(cfg: SpamConfig) -> Self {
        Self {
            cfg: cfg.sanitized(),
            trackers: EphemeralStore::new(),
        }
    }

    pub fn config(&self) -> &SpamConfig {
        &self.cfg
    }

    pub fn check_spam(
        &self,
        user_id: u64,
        guild_id: u64,
        fingerprint: Fingerprint,
        points: i64,
    ) -> TrackerResult<SpamVerdict> {
        self.check_spam_at(user_id, guild_id, fingerprint, points, Instant::now())
    }

    pub fn check_spam_at(
        &self,
        user_id: u64,
        guild_id: u64,
        fingerprint: Fingerprint,
        points: i64,
        now: Instant,
    ) -> TrackerResult<SpamVerdict> {
        if points < 0 {
            return Err(TrackerError::InvalidArgument("points must not be negative"));
        }
        let key = SpamKey::new(user_id, guild_id)?;
        let capacity = self.cfg.cache_capacity;
        let window = self.cfg.decay_window();

        // Cała sekwencja read-modify-write pod blokadą wpisu.
        let mut tracker = self
            .trackers
            .entry_or_insert_with(key, || SpamTracker::new(now, capacity));

        let elapsed = now.saturating_duration_since(tracker.last_update);
        let decayed = decay_points(tracker.point_total, elapsed, window);
        if elapsed >= window {
            // wszystko wygasło – reset, łącznie z historią treści
            tracker.message_cache.clear();
        }

        let mut total = decayed.saturating_add(points as u64);

        let repeated = tracker.message_cache.contains(&fingerprint);
        if repeated {
            total = total.saturating_add(self.cfg.repeat_penalty);
        }

        while tracker.message_cache.len() >= capacity {
            tracker.message_cache.pop_front();
        }
        tracker.message_cache.push_back(fingerprint);

        tracker.point_total = total;
        // `now` czytamy przed blokadą – przy wyścigu może być starszy niż zapisany
        tracker.last_update = tracker.last_update.max(now);
        drop(tracker);

        let over_threshold = total >= self.cfg.threshold;
        if over_threshold {
            warn!(user_id, guild_id, points = total, repeated, "spam threshold reached");
        } else {
            debug!(user_id, guild_id, points = total, repeated, "spam check");
        }

        Ok(SpamVerdict {
            point_total: total,
            over_threshold,
            repeated,
        })
    }

    /// Aktualna (niezdecayowana) suma dla klucza, jeśli jest tracker.
    pub fn tracker_points(&self, user_id: u64, guild_id: u64) -> Option<u64> {
        let key = SpamKey { user_id, guild_id };
        self.trackers.get_cloned(&key).map(|t| t.point_total)
    }

    pub fn cached_fingerprints(&self, user_id: u64, guild_id: u64) -> usize {
        let key = SpamKey { user_id, guild_id };
        self.trackers
            .get_cloned(&key)
            .map(|t| t.message_cache.len())
            .unwrap_or(0)
    }

    /// Zerowanie po akcji moderacyjnej.
    pub fn reset(&self, user_id: u64, guild_id: u64) -> bool {
        self.trackers.remove(&SpamKey { user_id, guild_id })
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn evict_older_than(&self, now: Instant, horizon: Duration) -> usize {
        self.trackers.evict_older_than(now, horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scorer() -> SpamScorer {
        SpamScorer::new(SpamConfig {
            threshold: 20,
            decay_window_secs: 10,
            cache_capacity: 3,
            repeat_penalty: 5,
        })
    }

    #[test]
    fn rejects_negative_points_and_zero_ids() {
        let s = scorer();
        assert!(matches!(
            s.check_spam(1, 1, 0, -1),
            Err(TrackerError::InvalidArgument(_))
        ));
        assert!(s.check_spam(0, 1, 0, 1).is_err());
        assert!(s.check_spam(1, 0, 0, 1).is_err());
        assert!(s.is_empty());
    }

    #[test]
    fn half_window_halves_points() {
        let s = scorer();
        let t0 = Instant::now();
        s.check_spam_at(1, 1, 10, 10, t0).unwrap();
        let v = s.check_spam_at(1, 1, 11, 0, t0 + Duration::from_secs(5)).unwrap();
        assert_eq!(v.point_total, 5);
    }

    #[test]
    fn cache_is_bounded_fifo() {
        let s = scorer();
        let t0 = Instant::now();
        for fp in 1..=5u64 {
            s.check_spam_at(7, 7, fp, 0, t0).unwrap();
        }
        assert_eq!(s.cached_fingerprints(7, 7), 3);
        // 1 i 2 wypadły – powtórka "1" nie daje kary
        let v = s.check_spam_at(7, 7, 1, 0, t0).unwrap();
        assert!(!v.repeated);
        let v = s.check_spam_at(7, 7, 5, 0, t0).unwrap();
        assert!(v.repeated);
    }

    #[test]
    fn full_decay_clears_repeat_history() {
        let s = scorer();
        let t0 = Instant::now();
        s.check_spam_at(3, 3, 99, 4, t0).unwrap();
        let v = s
            .check_spam_at(3, 3, 99, 4, t0 + Duration::from_secs(11))
            .unwrap();
        assert!(!v.repeated);
        assert_eq!(v.point_total, 4);
    }

    #[test]
    fn reset_drops_tracker() {
        let s = scorer();
        s.check_spam(5, 6, 1, 3).unwrap();
        assert_eq!(s.tracker_points(5, 6), Some(3));
        assert!(s.reset(5, 6));
        assert_eq!(s.tracker_points(5, 6), None);
    }

    #[test]
    fn decay_of_huge_totals_over_huge_windows_does_not_overflow() {
        let window = Duration::from_secs(u64::MAX);
        let d = decay_points(u64::MAX, Duration::from_secs(1), window);
        assert!(d > u64::MAX / 2);
        let half = decay_points(u64::MAX, Duration::from_secs(u64::MAX / 2), window);
        assert!(half <= d);
        assert!(half < u64::MAX / 4 * 3);
    }

    #[test]
    fn max_points_with_oversized_window_stay_saturated() {
        let s = SpamScorer::new(SpamConfig {
            threshold: 20,
            decay_window_secs: u64::MAX / 2,
            cache_capacity: 3,
            repeat_penalty: 5,
        });
        let t0 = Instant::now();
        s.check_spam_at(1, 1, 1, i64::MAX, t0).unwrap();
        let v = s
            .check_spam_at(1, 1, 2, i64::MAX, t0 + Duration::from_secs(1))
            .unwrap();
        assert!(v.over_threshold);
        assert!(v.point_total > i64::MAX as u64);
    }

    #[test]
    fn out_of_order_call_does_not_rewind_last_update() {
        let s = scorer();
        let t0 = Instant::now();
        let late = t0 + Duration::from_secs(100);
        s.check_spam_at(1, 1, 1, 1, late).unwrap();
        s.check_spam_at(1, 1, 2, 1, t0).unwrap();
        let tracker = s.trackers.get_cloned(&SpamKey { user_id: 1, guild_id: 1 }).unwrap();
        assert_eq!(tracker.last_update, late);
    }

    proptest! {
        #[test]
        fn decay_is_monotonic_and_bounded(
            total in 0u64..1_000_000,
            a in 0u64..20_000,
            b in 0u64..20_000,
            window_ms in 1u64..15_000,
        ) {
            let window = Duration::from_millis(window_ms);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let d_lo = decay_points(total, Duration::from_millis(lo), window);
            let d_hi = decay_points(total, Duration::from_millis(hi), window);
            prop_assert!(d_lo <= total);
            prop_assert!(d_hi <= d_lo);
            if hi >= window_ms {
                prop_assert_eq!(d_hi, 0);
            }
        }

        #[test]
        fn cache_never_exceeds_capacity(fps in proptest::collection::vec(0u64..8, 0..64)) {
            let s = scorer();
            let t0 = Instant::now();
            for fp in fps {
                s.check_spam_at(1, 2, fp, 1, t0).unwrap();
                prop_assert!(s.cached_fingerprints(1, 2) <= s.config().cache_capacity);
            }
        }
    }
}
