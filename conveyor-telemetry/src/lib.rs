//! Tracing initialization for conveyor binaries and tests.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber for a binary.
///
/// The filter is taken from `RUST_LOG` when set and falls back to `info`
/// otherwise. Safe to call multiple times; only the first call installs the
/// subscriber, later calls are no-ops. This matters for tests, where every
/// test function may attempt initialization.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Ignore the error returned when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

/// Initializes tracing for tests, routing output through the test writer so
/// logs are captured per test instead of interleaving on stdout.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
