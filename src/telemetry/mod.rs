//! Tracing initialization for binaries, demos and tests.
//!
//! The library itself only ever emits through `tracing`; installing a
//! subscriber is the embedding application's call. These helpers set up the
//! subscriber stack used throughout the project: env-filter, fmt output and
//! the `tracing-error` [`ErrorLayer`] so span traces attach to diagnostics.

use tracing_error::ErrorLayer;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn,delvegraph=info";

/// Installs the default subscriber stack.
///
/// Safe to call more than once; later calls are no-ops. `RUST_LOG`
/// overrides [`DEFAULT_FILTER`].
pub fn init_tracing() {
    init_tracing_with(DEFAULT_FILTER);
}

/// Installs the subscriber stack with an explicit fallback filter.
pub fn init_tracing_with(directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .unwrap_or_default();
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_tracing();
        init_tracing();
        init_tracing_with("debug");
    }
}
