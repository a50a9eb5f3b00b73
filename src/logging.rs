//! Tracing subscriber setup for the CLI
//!
//! `RUST_LOG` wins when set; otherwise the `-v` count picks the level for
//! this workspace's crates. Logs go to stderr so JSON on stdout stays clean.

use std::io;

use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log level for a `-v` count.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Default filter directive for a `-v` count.
pub fn default_directive(verbosity: u8) -> String {
    let level = level_for_verbosity(verbosity);
    format!(
        "task_resource_cache={level},resource_worker={level},resource_descriptor={level}",
        level = level
    )
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(verbosity: u8) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(io::stderr),
        )
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for_verbosity(0), "warn");
        assert_eq!(level_for_verbosity(1), "info");
        assert_eq!(level_for_verbosity(2), "debug");
        assert_eq!(level_for_verbosity(9), "trace");
    }

    #[test]
    fn test_default_directive_parses() {
        let directive = default_directive(1);
        assert!(directive.contains("resource_worker=info"));
        assert!(EnvFilter::try_new(directive).is_ok());
    }
}
