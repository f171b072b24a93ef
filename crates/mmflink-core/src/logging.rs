//! Tracing subscriber bootstrap for hosts embedding the bridge.

use crate::config::{env_vars, parse_flag};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "mmflink=info";

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`, and switches to JSON lines when `MMFLINK_LOG_JSON` is
/// set. Safe to call more than once: later calls are ignored.
pub fn init() {
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)
            .add_directive(tracing::Level::WARN.into())
    });

    let result = if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(json = json_logging, "logging initialized");
    }
}
