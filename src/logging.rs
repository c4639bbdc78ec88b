//! Diagnostic logging
//!
//! Human-facing progress goes to stdout via `println!`; everything else is a
//! `tracing` event written to stderr. `RUST_LOG` wins over the defaults.

use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "index_sync=debug,warn"
    } else {
        "warn"
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(verbose: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose)))
        .map_err(|e| anyhow!("Invalid log filter: {e}"))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}
