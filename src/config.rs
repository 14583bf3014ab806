use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub discord: Discord,
    pub logging: Logging,
    pub spam: SpamConfig,
    pub eviction: EvictionConfig,
    pub scoring: ScoringWeights,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub intents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub level: Option<String>,
    /// Kolory ANSI w konsoli (wyłącz pod journald/docker logs).
    pub ansi: Option<bool>,
}

/// Górna granica okna decayu (24h).
pub const MAX_DECAY_WINDOW_SECS: u64 = 86_400;

/// Parametry SpamScorera.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpamConfig {
    pub threshold: u64,
    pub decay_window_secs: u64,
    pub cache_capacity: usize,
    pub repeat_penalty: u64,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            decay_window_secs: 30,
            cache_capacity: 8,
            repeat_penalty: 10,
        }
    }
}

impl SpamConfig {
    /// Klamry: próg >= 1, okno 1s..=24h, bufor 1..=256, kara za powtórkę >= 1.
    pub fn sanitized(mut self) -> Self {
        self.threshold = self.threshold.max(1);
        self.decay_window_secs = self.decay_window_secs.clamp(1, MAX_DECAY_WINDOW_SECS);
        self.cache_capacity = self.cache_capacity.clamp(1, 256);
        self.repeat_penalty = self.repeat_penalty.max(1);
        self
    }

    pub fn decay_window(&self) -> Duration {
        Duration::from_secs(self.decay_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvictionConfig {
    pub interval_secs: u64,
    pub retention_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            retention_secs: 6 * 3600,
        }
    }
}

impl EvictionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Wagi redukcji wiadomości do punktów (adapter gatewaya).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringWeights {
    pub base: i64,
    pub per_mention: i64,
    pub per_attachment: i64,
    pub link: i64,
    pub everyone_mention: i64,
    pub per_100_chars: i64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 2,
            per_mention: 2,
            per_attachment: 3,
            link: 5,
            everyone_mention: 10,
            per_100_chars: 1,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Które środowisko?
        let env = std::env::var("TSS_ENV").unwrap_or_else(|_| "development".to_string());

        // Załaduj .env.<env> i .env (jeśli są)
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        // Warstwy: domyślne -> plik TOML -> zmienne środowiskowe TSS_*
        let figment = Figment::from(Serialized::defaults(Self::defaults(&env)))
            .merge(Toml::file(format!("config/{}.toml", env)))
            // TSS_SPAM_THRESHOLD => spam.threshold itd.
            .merge(Env::prefixed("TSS_").split("_"));

        let mut s: Settings = figment.extract()?;
        s.env = env;
        s.spam = s.spam.sanitized();

        Ok(s)
    }

    pub fn defaults(env: &str) -> Self {
        Self {
            env: env.to_string(),
            app: App {
                name: "Tigris Sentinel".into(),
            },
            discord: Discord {
                token: "".into(),
                intents: vec![
                    "GUILDS".into(),
                    "GUILD_MEMBERS".into(),
                    "GUILD_MESSAGES".into(),
                    "MESSAGE_CONTENT".into(),
                    "GUILD_INVITES".into(),
                ],
            },
            logging: Logging {
                level: Some("info".into()),
                ansi: Some(true),
            },
            spam: SpamConfig::default(),
            eviction: EvictionConfig::default(),
            scoring: ScoringWeights::default(),
        }
    }
}
