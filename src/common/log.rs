//! Logging bootstrap emitting JSON lines (or plain text) through `tracing`.
//!
//! Services log with a shared field vocabulary: `ev` for the event name,
//! `code` for the [`FleetCode`](super::error::FleetCode) and `dur_ms` for timings.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::config::AppCfg;

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init(cfg: &AppCfg) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cfg.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!(ev = "log_init_skipped", "subscriber already installed");
    }
}
