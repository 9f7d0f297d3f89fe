//! Process-wide tracing setup.
//!
//! The global subscriber only ever writes to stderr. Per-session capture is
//! layered on top by `session_log`, which installs a thread-scoped subscriber
//! for the duration of one subject/session.

use std::env;

use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<bool> = OnceCell::new();

/// The `debug` flag the global subscriber was installed with.
pub fn debug_enabled() -> bool {
    INIT.get().copied().unwrap_or(false)
}

/// Filter directive used when RUST_LOG is unset.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Build the stderr filter: RUST_LOG wins, then the gear `debug` flag.
pub fn stderr_filter(debug: bool) -> EnvFilter {
    match env::var("RUST_LOG") {
        Ok(s) if !s.trim().is_empty() => {
            EnvFilter::try_new(s.trim()).unwrap_or_else(|_| EnvFilter::new(default_filter(debug)))
        }
        _ => EnvFilter::new(default_filter(debug)),
    }
}

/// Install the global stderr subscriber once. Returns false when a subscriber
/// was already set (second call, or an embedding host installed its own).
pub fn telemetry_init(debug: bool) -> bool {
    if INIT.get().is_some() {
        return false;
    }

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(crate::color_enabled_stderr());

    let registry = tracing_subscriber::registry()
        .with(stderr_filter(debug))
        .with(fmt_layer);

    if registry.try_init().is_err() {
        eprintln!("gambas-gear: tracing init skipped (global subscriber already set)");
        return false;
    }

    let _ = INIT.set(debug);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_follows_debug_flag() {
        assert_eq!(default_filter(true), "debug");
        assert_eq!(default_filter(false), "info");
    }
}
