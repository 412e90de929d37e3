//! Diagnostic tracing for devcycle.
//!
//! Tracing goes to stderr and is never persisted. The transcript log written by
//! [`crate::io::transcript_log`] is the run's product artifact and is written
//! regardless of the filter configured here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for a `-v` count when `RUST_LOG` is unset.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "devcycle=info,warn",
        _ => "devcycle=debug,info",
    }
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows `verbose`.
///
/// ```bash
/// RUST_LOG=devcycle=debug devcycle run "add health check"
/// devcycle -vv run "add health check"
/// ```
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
