//! Tracing/logging initialization.
//!
//! Events are emitted as JSON lines. Filtering follows `RUST_LOG`
//! (e.g. `RUST_LOG=chronicle_infra=debug`), defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Install the JSON subscriber with the `RUST_LOG` filter.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    init_with_filter(filter);
}

/// Install the JSON subscriber with an explicit filter.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_with_filter(filter: EnvFilter) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialization_is_a_noop() {
        init();
        assert!(!init_with_filter(EnvFilter::new("debug")));
        ::tracing::info!(component = "observability", "still logging after re-init");
    }
}
