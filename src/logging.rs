use crate::config::Settings;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

/// Inicjalizacja logowania.
/// RUST_LOG ma pierwszeństwo przed `logging.level` z konfiguracji.
pub fn init(settings: &Settings) {
    let level = settings
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "info".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_ansi(settings.logging.ansi.unwrap_or(true));

    // try_init: drugi bootstrap w tym samym procesie (testy) nie panikuje
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
