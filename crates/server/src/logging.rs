//! Structured logging setup for the orchestrator process. Distinct from a
//! player's own `log()` calls, which never reach these subscribers — see
//! `redoubt_runtime::sandbox::PlayerLogLine`.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `info` when unset. Safe to call once per
/// process; a second call is a no-op (the error from `try_init` is
/// swallowed).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
