//! Tracing subscriber setup for the binary.
//!
//! Logs go to stderr so that stdout carries only the JSON result record.

use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing::{Level, Subscriber};
use tracing_log::LogTracer;
use tracing_log::log_tracer::SetLoggerError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The `log` bridge could not be installed.
    #[error("failed to bridge log records: {0}")]
    LogBridge(#[from] SetLoggerError),
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Builds a compact subscriber writing to `sink`.
///
/// `RUST_LOG` takes precedence; `default_level` applies when it is unset or
/// unparsable.
pub fn get_subscriber<Sink>(default_level: Level, sink: Sink) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_error| EnvFilter::new(default_level.as_str()));

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(sink)
        .finish()
}

/// Installs `subscriber` as the global default. Call once per process.
///
/// # Errors
///
/// Returns [`TelemetryError`] when a logger or subscriber is already set.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> Result<(), TelemetryError> {
    LogTracer::init()?;
    set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;

    #[test]
    fn subscriber_writes_to_the_given_sink() {
        let subscriber = get_subscriber(Level::INFO, std::io::sink);
        with_default(subscriber, || {
            tracing::info!("routed to the sink");
        });
    }
}
