//! Structured logging bootstrap shared by `capmuxd` and the test harness.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that writes to stderr, honoring `RUST_LOG`
/// (defaulting to `info` when unset). Idempotent-safe to call once per process;
/// calling it twice in the same process will panic, matching `tracing`'s own
/// global-subscriber contract.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
