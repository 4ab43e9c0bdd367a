//! Tracing setup for binaries and tests

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,ledger_runtime=debug";

/// Output format of the fmt subscriber
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over `filter`. Returns `false` if a global
/// subscriber was already installed.
pub fn init_tracing(filter: &str, format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_target(true);

    match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

/// Route tracing output through the test harness; safe to call from every test
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
        assert!(!init_tracing(DEFAULT_LOG_FILTER, LogFormat::Json));
    }
}
