//! Diagnostic logging setup for the command-line binary.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the filter directive, e.g. `reshelf=debug`.
pub const LOG_ENV: &str = "RESHELF_LOG";

/// Installs a stderr subscriber.
///
/// `RESHELF_LOG` wins when set. Otherwise the level is `warn`, or `debug`
/// when `verbose` is true. Calling this twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .try_init();
}
