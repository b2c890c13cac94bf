//! Log output for test runs

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a subscriber that writes through the test harness's capture
///
/// Safe to call from every test; only the first call has an effect.
/// `RUST_LOG` overrides the default filter.
pub fn init() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,termscope=info"));

        // Respect NO_COLOR environment variable
        let use_ansi = std::env::var("NO_COLOR").is_err();

        let installed = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_ansi(use_ansi),
            )
            .with(filter)
            .try_init();

        if installed.is_err() {
            tracing::debug!("a global subscriber was already installed");
        }
    });
}
