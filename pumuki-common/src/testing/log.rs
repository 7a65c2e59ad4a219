//! Structured test logging.
//!
//! Call [`init_global_test_logging`] at the top of a test to capture
//! `tracing` output. Safe to call from every test; initialization happens once.

use std::sync::Once;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

static GLOBAL_LOGGING_INIT: Once = Once::new();

/// Initialize test logging for the whole process.
///
/// Human-readable output goes through the libtest capture writer. With
/// `PUMUKI_TEST_LOG_JSON=1` events are emitted as JSON lines instead.
/// `PUMUKI_TEST_LOG_LEVEL` sets the filter (default: `debug`).
pub fn init_global_test_logging() {
    GLOBAL_LOGGING_INIT.call_once(|| {
        let level = std::env::var("PUMUKI_TEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let filter = EnvFilter::try_new(format!(
            "pumuki_common={level},pumuki_ingest={level},pumukid={level}"
        ))
        .unwrap_or_else(|_| EnvFilter::new("info"));

        let json = std::env::var("PUMUKI_TEST_LOG_JSON").is_ok_and(|v| v == "1");
        let json_layer = json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_test_writer()
                .with_current_span(true)
        });
        let text_layer = (!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_test_writer()
                .with_target(true)
                .compact()
        });

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(text_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
