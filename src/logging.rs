//! Logging configuration
//!
//! Structured logging with tracing. Logs go to stderr so stdout only
//! carries the addresses printed by the CLI.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Initialize logging
///
/// `RUST_LOG` overrides the default `tavern=info` unless `verbose` forces
/// `tavern=debug`.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tavern=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tavern=info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
