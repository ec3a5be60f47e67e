//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "evidex_core=info,evidex_orchestrator=info";

/// Installs the global subscriber: an `EnvFilter` from `RUST_LOG` (falling back
/// to `default_filter`, or [`DEFAULT_FILTER`] when `None`) and a fmt layer on
/// stderr.
///
/// Returns `false` if a global subscriber was already installed, in which case
/// nothing changes.
pub fn init_logging(default_filter: Option<&str>) -> bool {
    let fallback = default_filter.unwrap_or(DEFAULT_FILTER);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}
