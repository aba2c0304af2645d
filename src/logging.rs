use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

fn crate_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("model_builder={},warn", level)))
}

/// Installs the global subscriber. `RUST_LOG` overrides `level`; later
/// calls are no-ops.
pub fn init_logging(level: Level, json_output: bool) {
    INIT.call_once(|| {
        // event fields sit at the top level of each JSON line
        let output = if json_output {
            fmt::layer().json().flatten_event(true).boxed()
        } else {
            fmt::layer().with_target(false).compact().boxed()
        };

        if let Err(e) = Registry::default()
            .with(crate_filter(level))
            .with(output)
            .try_init()
        {
            eprintln!("logging already initialised: {}", e);
        }
    });
}

/// Parses a level name such as `info` or `DEBUG`.
pub fn parse_level(name: &str) -> Option<Level> {
    name.parse().ok()
}
