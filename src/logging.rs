//! Diagnostic logging
//!
//! Off unless `RUST_LOG` is set (e.g. `RUST_LOG=tmcheck=debug`), so the
//! stdout dump stays byte-identical between runs. Logs go to stderr.

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing. Safe to call multiple times.
pub fn init() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(filter)
                .init();
        }
    });
}
