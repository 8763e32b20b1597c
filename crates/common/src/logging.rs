//! Logging setup.
//!
//! Components log through `tracing` and never require a live sink: until
//! [`init_logging`] installs a subscriber every log call is a no-op.

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level when `RUST_LOG` is not set
    pub level: Level,
    /// Emit one JSON object per event
    pub json_output: bool,
    /// ANSI colours (human-readable output only)
    pub color_output: bool,
    pub include_thread_names: bool,
    pub include_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_output: false,
            color_output: true,
            include_thread_names: true,
            include_line_numbers: cfg!(debug_assertions),
        }
    }
}

impl LoggingConfig {
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            ..Default::default()
        }
    }

    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json_output: true,
            color_output: false,
            include_thread_names: true,
            include_line_numbers: false,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    if config.json_output {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(config.include_thread_names)
            .with_line_number(config.include_line_numbers);

        let subscriber = Registry::default().with(env_filter).with(json_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(config.include_thread_names)
            .with_line_number(config.include_line_numbers)
            .with_ansi(config.color_output)
            .with_span_events(FmtSpan::CLOSE);

        let subscriber = Registry::default().with(env_filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Route logs into the test harness output. Safe to call from every test.
pub fn init_test_logging() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
