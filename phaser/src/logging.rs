//! Diagnostic tracing for the phaser binary.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: operator and developer diagnostics via
//!   `RUST_LOG`, written to stderr. Not persisted.
//!
//! - **Activity trail (`io/audit`)**: product artifact in
//!   `.phaser/logs/activity_log.csv`. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Reads `RUST_LOG`. Defaults to `phaser=info,warn`, or `phaser=debug,warn`
/// with `verbose`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=phaser=trace phaser status
/// ```
pub fn init(verbose: bool) {
    let default = if verbose {
        "phaser=debug,warn"
    } else {
        "phaser=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
