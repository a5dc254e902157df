//! Log subscriber setup. Logs go to stderr so stdout carries only the JSON envelope.

use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

const CRATE_TARGETS: [&str; 3] = ["stockpulse", "stockpulse_core", "stockpulse_warehouse"];

/// `RUST_LOG` wins when set; otherwise `level` applies to this workspace and
/// dependencies stay at `warn`.
pub fn init(level: LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_writer(io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .try_init()
    };

    if let Err(error) = result {
        eprintln!("warning: log subscriber not installed: {error}");
    }
}

fn default_directives(level: LogLevel) -> String {
    let mut directives = vec![String::from("warn")];
    directives.extend(
        CRATE_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_str())),
    );
    directives.join(",")
}
