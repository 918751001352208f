//! `tracing` subscriber setup.
//!
//! Pilot logs through the `tracing` macros; the embedding process calls one
//! of the `init_*` functions once at startup. `RUST_LOG` takes precedence
//! over the configured level. Repeated calls are no-ops.

use tracing_subscriber::EnvFilter;

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global subscriber with compact human-readable output on
/// stderr.
///
/// # Arguments
///
/// * `level` - Minimum level or filter directive (e.g. `"warn"`,
///   `"pilot_session=debug"`).
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

/// Initialize the global subscriber with one JSON object per line on stderr.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}

/// Initialize from a level and a JSON toggle, as carried by the logging
/// section of the settings.
pub fn init_from(level: &str, json: bool) {
    if json {
        init_json_subscriber(level);
    } else {
        init_subscriber(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
        init_from("trace", true);
    }
}
