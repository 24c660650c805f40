//! Tracing bootstrap
//!
//! The library only emits `tracing` events; embedders that have no
//! subscriber of their own can install the default one here.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_directive`
///
/// Returns `false` when a global subscriber was already installed, which makes
/// repeated calls (e.g. from several tests) harmless.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing("info");
        assert!(!init_tracing("debug"));
    }
}
