//! Tracing setup shared by `rollcall-server` and the `rollcall` client.
//!
//! Logs always go to stderr; the client's stdout carries command output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter` (e.g. `"rollcall_server=info"`).
/// With `log_json` every event is one JSON object per line.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let output = if log_json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .init();
}
