//! Tracing setup for the CLI and the bridge that carries engine logs into it.

use std::sync::Arc;

use gatekit_core::logger::{self, LogLevel, Logger};
use tracing_subscriber::EnvFilter;

/// Re-emits engine records as tracing events under the `gatekit_core` target.
struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "gatekit_core", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "gatekit_core", "{message}"),
            LogLevel::Info => tracing::info!(target: "gatekit_core", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "gatekit_core", "{message}"),
            LogLevel::Error => tracing::error!(target: "gatekit_core", "{message}"),
        }
    }
}

/// Installs a stderr subscriber. `-v` flags win over `RUST_LOG`, which wins
/// over the `warn` default.
pub fn init(verbosity: u8) -> eyre::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))?,
        level => EnvFilter::try_new(directive(level))?,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    logger::set_logger(Arc::new(TracingLogger));
    Ok(())
}

const fn directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_maps_to_levels() {
        assert_eq!(directive(1), "info");
        assert_eq!(directive(2), "debug");
        assert_eq!(directive(9), "trace");
    }
}
