//! Tracing subscriber setup for binaries embedding the ring.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the application.

use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    EnvFilter,
};

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set, e.g. `"zring=debug"`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Include the event target (module path).
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Level from the usual `-v` / `-q` command line switches. `quiet` wins.
    pub fn from_verbosity(
        verbose: bool,
        quiet: bool,
    ) -> Self {
        let level = if quiet {
            "off"
        } else if verbose {
            "debug"
        } else {
            "warn"
        };
        Self {
            level: level.into(),
            with_target: false,
            ..Self::default()
        }
    }
}

/// Builds the event filter: `RUST_LOG` if set, else the configured level,
/// else `info` when the configured directive does not parse.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).unwrap_or_else(|e| {
            eprintln!(
                "Invalid log filter directive '{}': {e}; falling back to 'info'",
                config.level
            );
            EnvFilter::new("info")
        }),
    }
}

/// Builds the `fmt` subscriber described by `config`, writing to `writer`.
///
/// JSON output puts the event fields under a `fields` object, one event per
/// line.
pub fn build_subscriber<W>(
    config: &LoggingConfig,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = fmt::fmt()
        .with_env_filter(build_filter(config))
        .with_writer(writer)
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.finish())
    }
}

/// Installs the global subscriber writing to stderr. Fails if one is already
/// installed.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing::subscriber::set_global_default(build_subscriber(config, std::io::stderr))?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        json = config.json,
        "Logging initialized"
    );
    Ok(())
}
