//! Tracing bootstrap for embedders without their own subscriber.
//!
//! Library code only emits through `tracing` macros; hosts that already
//! install a subscriber (the web layer does) never need to call this.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "annolab=info";

/// Install a fmt subscriber with `RUST_LOG` override support.
///
/// Idempotent: repeated calls after the first are no-ops, so test binaries
/// and embedding hosts can both call it unconditionally.
pub fn init() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
            )
            .init();
    });
}
