// Tracing setup shared by the binaries

use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, EnvFilter};

/// Map a configured level onto an `EnvFilter` directive.
///
/// Python-style names (`WARNING`, `CRITICAL`) are accepted alongside
/// tracing's own. Anything with `=` or `,` is a full directive and is
/// passed through untouched.
pub fn normalize_level(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "notset" => "trace".to_string(),
        other => other.to_string(),
    }
}

/// Build the filter: `RUST_LOG` when set and valid, else `level`, else `warn`
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(normalize_level(level)))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Safe to call more than once; only the
/// first call takes effect.
pub fn init(level: &str) {
    let format_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter(level))
        .with(format_layer)
        .try_init();
}
