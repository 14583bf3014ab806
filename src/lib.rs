// src/lib.rs

pub mod config;
pub mod discord;
pub mod error;
pub mod fingerprint;
pub mod invites;
pub mod logging;
pub mod spam;
pub mod store;
pub mod sweeper;

pub use error::{TrackerError, TrackerResult};
pub use invites::{Attribution, AttributedInvite, InviteAttributor, InviteSnapshot, ObservedInvite};
pub use spam::{SpamKey, SpamScorer, SpamVerdict};
pub use sweeper::{EvictionSweeper, SweepReport};

use anyhow::Result;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::task::JoinHandle;

use config::Settings;

/// Globalny kontekst aplikacji.
/// Trzyma konfigurację i oba trackery (invite / spam) + sweeper.
pub struct AppContext {
    pub settings: Settings,
    invites: Arc<InviteAttributor>,
    spam: Arc<SpamScorer>,
    sweeper: EvictionSweeper,
    sweeper_task: Mutex<Option<JoinHandle<()>>>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - trackery w pamięci
    /// - sweeper w tle (wymaga runtime tokio)
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        // 1) logi
        logging::init(&settings);

        // 2) trackery
        let ctx = Arc::new(Self::build(settings));

        // 3) sweeper
        let handle = ctx.sweeper.spawn(
            ctx.settings.eviction.interval(),
            ctx.settings.eviction.retention(),
        );
        if let Ok(mut slot) = ctx.sweeper_task.lock() {
            *slot = Some(handle);
        }

        tracing::info!(
            app = %ctx.settings.app.name,
            env = %ctx.settings.env,
            retention_secs = ctx.settings.eviction.retention_secs,
            "context bootstrapped"
        );
        Ok(ctx)
    }

    /// Kontekst bez logowania i bez taska w tle (testy).
    pub fn new_testing(settings: Settings) -> Arc<Self> {
        Arc::new(Self::build(settings))
    }

    fn build(settings: Settings) -> Self {
        let invites = Arc::new(InviteAttributor::new());
        let spam = Arc::new(SpamScorer::new(settings.spam.clone()));
        let sweeper = EvictionSweeper::new(invites.clone(), spam.clone());
        Self {
            settings,
            invites,
            spam,
            sweeper,
            sweeper_task: Mutex::new(None),
        }
    }

    pub fn invites(&self) -> Arc<InviteAttributor> {
        self.invites.clone()
    }

    pub fn spam(&self) -> Arc<SpamScorer> {
        self.spam.clone()
    }

    pub fn sweeper(&self) -> &EvictionSweeper {
        &self.sweeper
    }

    /// Zatrzymuje sweeper w tle (np. przy shutdownie).
    pub fn stop_sweeper(&self) {
        if let Ok(mut slot) = self.sweeper_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

/// Start klienta Discorda (adapter zdarzeń -> trackery).
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    discord::run_bot(ctx).await
}
