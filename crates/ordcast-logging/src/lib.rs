//! Logging setup for ordcast binaries.
//!
//! Filtering follows `RUST_LOG` when set, otherwise [`DEFAULT_FILTER`].
//! Libraries only emit `tracing` events; binaries call [`init`] once at
//! startup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive. Target matching is by prefix, so this covers every
/// `ordcast_*` crate.
pub const DEFAULT_FILTER: &str = "ordcast=info";

/// Build the filter, preferring `RUST_LOG` over `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into())
}

/// Install the global subscriber with [`DEFAULT_FILTER`].
pub fn init() {
    init_with(DEFAULT_FILTER);
}

/// Install the global subscriber.
///
/// Calling this twice is harmless: the second call keeps the existing
/// subscriber.
pub fn init_with(default_directive: &str) {
    let result = tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::debug!(default_directive, "logging initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        let filter = env_filter(DEFAULT_FILTER);
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init_with("debug");
    }
}
