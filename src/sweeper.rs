//! src/sweeper.rs
//! EvictionSweeper – cykliczne sprzątanie obu trackerów.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::invites::InviteAttributor;
use crate::spam::SpamScorer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub invites_removed: usize,
    pub trackers_removed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.invites_removed + self.trackers_removed
    }
}

#[derive(Debug, Clone)]
pub struct EvictionSweeper {
    invites: Arc<InviteAttributor>,
    spam: Arc<SpamScorer>,
}

impl EvictionSweeper {
    pub fn new(invites: Arc<InviteAttributor>, spam: Arc<SpamScorer>) -> Self {
        Self { invites, spam }
    }

    /// Jeden przebieg: wszystko starsze niż `now - retention` wylatuje.
    /// Klucz po kluczu, bez globalnej pauzy.
    pub fn sweep(&self, now: Instant, retention: Duration) -> SweepReport {
        sweep_stores(&self.invites, &self.spam, now, retention)
    }

    /// Task w tle. Trzyma tylko `Weak` – kończy się sam, gdy trackery znikną.
    pub fn spawn(&self, every: Duration, retention: Duration) -> JoinHandle<()> {
        let invites: Weak<InviteAttributor> = Arc::downgrade(&self.invites);
        let spam: Weak<SpamScorer> = Arc::downgrade(&self.spam);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // pierwszy tick jest natychmiastowy – pomijamy go
            interval.tick().await;
            loop {
                interval.tick().await;
                let (Some(invites), Some(spam)) = (invites.upgrade(), spam.upgrade()) else {
                    debug!("eviction sweeper stopped (trackers dropped)");
                    break;
                };
                sweep_stores(&invites, &spam, Instant::now(), retention);
            }
        })
    }
}

fn sweep_stores(
    invites: &InviteAttributor,
    spam: &SpamScorer,
    now: Instant,
    retention: Duration,
) -> SweepReport {
    let report = SweepReport {
        invites_removed: invites.evict_older_than(now, retention),
        trackers_removed: spam.evict_older_than(now, retention),
    };
    if report.total() > 0 {
        info!(
            invites = report.invites_removed,
            trackers = report.trackers_removed,
            "eviction sweep"
        );
    }
    report
}
