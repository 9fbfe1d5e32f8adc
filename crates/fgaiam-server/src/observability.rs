//! Logging initialisation.
//!
//! Components log through `tracing` with structured fields. The process
//! embedding the pipeline installs a subscriber once, from the `logging`
//! config section: JSON lines in production, compact text in development.
//!
//! ```json
//! {"timestamp":"2026-01-15T10:30:00.000Z","level":"ERROR","fields":{"message":"upstream dependency failed","dependency":"keycloak"},"target":"fgaiam_server::errors"}
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level.

use std::str::FromStr;

use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    prelude::*,
    EnvFilter,
};

use crate::config::{ConfigLoadError, LoggingSettings};

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// JSON lines (true) or compact text (false)
    pub json_format: bool,
    /// Level used when RUST_LOG is not set
    pub default_level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
        }
    }
}

impl LoggingConfig {
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Builds the subscriber settings from the `logging` config section.
    pub fn from_settings(settings: &LoggingSettings) -> Result<Self, ConfigLoadError> {
        let level = Level::from_str(settings.level.trim()).map_err(|_| ConfigLoadError::Invalid {
            message: format!("logging.level '{}' is not a log level", settings.level),
        })?;
        Ok(Self {
            json_format: settings.json,
            default_level: level,
        })
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_level.to_string()))
    }
}

/// Subscriber for `config` writing to `writer`.
pub fn subscriber<W>(config: &LoggingConfig, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let output = if config.json_format {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer().compact().with_writer(writer).boxed()
    };

    tracing_subscriber::registry()
        .with(output)
        .with(config.filter())
}

/// Installs the global subscriber described by the `logging` section.
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<bool, ConfigLoadError> {
    let config = LoggingConfig::from_settings(settings)?;
    Ok(tracing::subscriber::set_global_default(subscriber(&config, std::io::stdout)).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{classify_error, ErrorConfig};
    use fgaiam_domain::DomainError;
    use std::sync::{Arc, Mutex};

    /// A writer that captures output to a shared buffer.
    #[derive(Clone)]
    struct CaptureWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl CaptureWriter {
        fn new() -> Self {
            Self {
                buffer: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn output(&self) -> String {
            let buffer = self.buffer.lock().unwrap();
            String::from_utf8_lossy(&buffer).to_string()
        }
    }

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_from_settings_parses_level() {
        let config = LoggingConfig::from_settings(&LoggingSettings {
            level: "debug".to_string(),
            json: true,
        })
        .unwrap();

        assert!(config.json_format);
        assert_eq!(config.default_level, Level::DEBUG);
    }

    #[test]
    fn test_from_settings_rejects_unknown_level() {
        let err = LoggingConfig::from_settings(&LoggingSettings {
            level: "verbose".to_string(),
            json: false,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigLoadError::Invalid { .. }));
    }

    #[test]
    fn test_init_logging_installs_once() {
        let settings = LoggingSettings {
            level: "info".to_string(),
            json: true,
        };

        init_logging(&settings).unwrap();
        assert!(tracing::dispatcher::has_been_set());
        assert!(!init_logging(&settings).unwrap());
    }

    #[test]
    fn test_init_logging_rejects_unknown_level() {
        let settings = LoggingSettings {
            level: "loud".to_string(),
            json: false,
        };
        assert!(matches!(
            init_logging(&settings),
            Err(ConfigLoadError::Invalid { .. })
        ));
    }

    #[test]
    fn test_text_format_is_not_json() {
        let writer = CaptureWriter::new();
        let subscriber = subscriber(&LoggingConfig::default(), writer.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(realm = "acme", "tenant resolved");
        });

        let output = writer.output();
        assert!(output.contains("tenant resolved"));
        assert!(output.contains("acme"));
        assert!(serde_json::from_str::<serde_json::Value>(output.trim()).is_err());
    }

    /// Test: upstream failures are logged as JSON with the dependency as a field
    #[test]
    fn test_upstream_failure_is_logged_as_structured_json() {
        let writer = CaptureWriter::new();
        let subscriber = subscriber(
            &LoggingConfig::json().with_level(Level::TRACE),
            writer.clone(),
        );

        tracing::subscriber::with_default(subscriber, || {
            classify_error(
                &DomainError::upstream("keycloak", "connection refused"),
                &ErrorConfig::production(),
            );
        });

        let output = writer.output();
        let line = output
            .lines()
            .find(|l| l.contains("upstream dependency failed"))
            .expect("error line should be logged");
        let json: serde_json::Value = serde_json::from_str(line).unwrap();

        assert_eq!(json["level"], "ERROR");
        assert_eq!(json["target"], "fgaiam_server::errors");
        assert_eq!(json["fields"]["dependency"], "keycloak");
        assert_eq!(json["fields"]["error"], "connection refused");
    }
}
