//! src/invites.rs
//! InviteAttributor – który invite "zjadł" nowy join.
//!
//! Trzymamy snapshot liczników użyć per kod zaproszenia. Przy joinie
//! porównujemy świeżą listę z gildii ze snapshotem: pierwszy kod (w kolejności
//! podanej przez wywołującego), którego licznik się zmienił, wygrywa.
//!
//! Świadomie nie jest to linearizowalne: dwa joiny w krótkim odstępie mogą
//! porównywać się z tym samym snapshotem. Atomowy jest tylko zapis per kod.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{TrackerError, TrackerResult};
use crate::store::{EphemeralStore, Stamped};

/// Zaproszenie tak, jak zwraca je platforma.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedInvite {
    pub code: String,
    pub use_count: u64,
    pub inviter_id: Option<u64>,
}

impl ObservedInvite {
    pub fn new(code: impl Into<String>, use_count: u64) -> Self {
        Self {
            code: code.into(),
            use_count,
            inviter_id: None,
        }
    }

    pub fn with_inviter(mut self, inviter_id: u64) -> Self {
        self.inviter_id = Some(inviter_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteSnapshot {
    pub code: String,
    pub use_count: u64,
    pub inviter_id: Option<u64>,
    pub last_seen: Instant,
}

impl Stamped for InviteSnapshot {
    fn last_touch(&self) -> Instant {
        self.last_seen
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedInvite {
    pub code: String,
    pub use_count: u64,
    pub inviter_id: Option<u64>,
}

/// Wynik `attribute_join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    Invite(AttributedInvite),
    /// Vanity URL, OAuth, albo po prostu brak danych w snapshocie.
    Unknown,
}

impl Attribution {
    pub fn code(&self) -> Option<&str> {
        match self {
            Attribution::Invite(inv) => Some(inv.code.as_str()),
            Attribution::Unknown => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct InviteAttributor {
    snapshots: EphemeralStore<String, InviteSnapshot>,
}

impl InviteAttributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zapisuje świeży stan zaproszenia (INVITE_CREATE / odświeżenie).
    pub fn record_invite(&self, invite: &ObservedInvite) -> TrackerResult<()> {
        self.record_invite_at(invite, Instant::now())
    }

    /// Jak `record_invite`, z jawnym "teraz".
    /// Nadpisuje bezwarunkowo – licznik może też spaść (cache stanu platformy).
    pub fn record_invite_at(&self, invite: &ObservedInvite, now: Instant) -> TrackerResult<()> {
        if invite.code.is_empty() {
            return Err(TrackerError::InvalidArgument("invite code must not be empty"));
        }

        let mut snap = self
            .snapshots
            .entry_or_insert_with(invite.code.clone(), || InviteSnapshot {
                code: invite.code.clone(),
                use_count: invite.use_count,
                inviter_id: invite.inviter_id,
                last_seen: now,
            });
        snap.use_count = invite.use_count;
        if invite.inviter_id.is_some() {
            snap.inviter_id = invite.inviter_id;
        }
        // znacznik czasu nigdy nie cofa się (wywołania z opóźnionym `now`)
        snap.last_seen = snap.last_seen.max(now);

        debug!(code = %invite.code, uses = invite.use_count, "invite snapshot recorded");
        Ok(())
    }

    /// Rozgrzewka cache (np. GUILD_CREATE). Złe wpisy pomijamy.
    pub fn seed(&self, invites: &[ObservedInvite]) -> usize {
        let now = Instant::now();
        let mut recorded = 0;
        for inv in invites {
            match self.record_invite_at(inv, now) {
                Ok(()) => recorded += 1,
                Err(e) => debug!(error = %e, "skipping invite during seed"),
            }
        }
        recorded
    }

    /// Zaproszenie usunięte po stronie platformy.
    pub fn forget_invite(&self, code: &str) -> bool {
        self.snapshots.remove(code)
    }

    /// Atrybucja joina na podstawie pełnej listy zaproszeń gildii.
    pub fn attribute_join(&self, observed: &[ObservedInvite]) -> Attribution {
        self.attribute_join_at(observed, Instant::now())
    }

    pub fn attribute_join_at(&self, observed: &[ObservedInvite], now: Instant) -> Attribution {
        for inv in observed {
            if inv.code.is_empty() {
                debug!("observed invite without code – skipped");
                continue;
            }

            // Brak snapshotu => nie wiemy, czy się zmienił. Nie zapisujemy go też.
            let Some(mut snap) = self.snapshots.get_mut(inv.code.as_str()) else {
                continue;
            };

            if snap.use_count == inv.use_count {
                continue;
            }

            snap.use_count = inv.use_count;
            if inv.inviter_id.is_some() {
                snap.inviter_id = inv.inviter_id;
            }
            snap.last_seen = snap.last_seen.max(now);

            let attributed = AttributedInvite {
                code: snap.code.clone(),
                use_count: snap.use_count,
                inviter_id: snap.inviter_id,
            };
            drop(snap);

            info!(
                code = %attributed.code,
                uses = attributed.use_count,
                inviter = ?attributed.inviter_id,
                "join attributed to invite"
            );
            return Attribution::Invite(attributed);
        }

        Attribution::Unknown
    }

    pub fn snapshot(&self, code: &str) -> Option<InviteSnapshot> {
        self.snapshots.get_cloned(code)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn evict_older_than(&self, now: Instant, horizon: Duration) -> usize {
        self.snapshots.evict_older_than(now, horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributor_with(entries: &[(&str, u64)]) -> InviteAttributor {
        let a = InviteAttributor::new();
        for (code, uses) in entries {
            a.record_invite(&ObservedInvite::new(*code, *uses)).unwrap();
        }
        a
    }

    #[test]
    fn record_rejects_empty_code() {
        let a = InviteAttributor::new();
        let err = a.record_invite(&ObservedInvite::new("", 1)).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidArgument(_)));
        assert!(a.is_empty());
    }

    #[test]
    fn record_overwrites_even_when_count_drops() {
        let a = attributor_with(&[("abc", 9)]);
        a.record_invite(&ObservedInvite::new("abc", 2)).unwrap();
        assert_eq!(a.snapshot("abc").unwrap().use_count, 2);
    }

    #[test]
    fn first_changed_invite_in_caller_order_wins() {
        let a = attributor_with(&[("a", 1), ("b", 1)]);
        let res = a.attribute_join(&[ObservedInvite::new("b", 2), ObservedInvite::new("a", 2)]);
        assert_eq!(res.code(), Some("b"));
        // "a" nie został ruszony – zostaje do kolejnego porównania
        assert_eq!(a.snapshot("a").unwrap().use_count, 1);
    }

    #[test]
    fn inviter_is_carried_into_attribution() {
        let a = attributor_with(&[("xyz", 4)]);
        let res = a.attribute_join(&[ObservedInvite::new("xyz", 5).with_inviter(42)]);
        match res {
            Attribution::Invite(inv) => {
                assert_eq!(inv.inviter_id, Some(42));
                assert_eq!(inv.use_count, 5);
            }
            Attribution::Unknown => panic!("expected attribution"),
        }
    }

    #[test]
    fn seed_skips_invalid_and_forget_removes() {
        let a = InviteAttributor::new();
        let n = a.seed(&[ObservedInvite::new("ok", 1), ObservedInvite::new("", 3)]);
        assert_eq!(n, 1);
        assert!(a.forget_invite("ok"));
        assert!(!a.forget_invite("ok"));
    }
}
