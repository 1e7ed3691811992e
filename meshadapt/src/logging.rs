//! Tracing setup for the adaptation driver.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: loop progress and diagnostics via `RUST_LOG`,
//!   output to stderr.
//!
//! - **Stage logs (`io/process`)**: solver and remesher stdout/stderr in
//!   `log.out`/`log.err`/`amg.out`/`amg.err` inside each stage directory.
//!   Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` (or `debug` when `verbose`).
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=meshadapt=debug meshadapt run --config adap.toml
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
