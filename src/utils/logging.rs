use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid tracing directives: {0}")]
    InvalidFilter(String),

    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

/// How the fmt subscriber is set up.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Filter directives such as `tensorout=debug`. Falls back to `RUST_LOG`,
    /// then to `default_directive`.
    pub directives: Option<String>,
    pub default_directive: String,
    pub ansi: bool,
    pub include_targets: bool,
    /// Log span close events, handy to time each op call
    pub log_span_close: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            ansi: true,
            include_targets: true,
            log_span_close: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    pub fn resolve_filter(&self) -> Result<EnvFilter, LoggingError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|e| LoggingError::InvalidFilter(e.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

/// Install the global fmt subscriber described by `config`.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let span_events = if config.log_span_close {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    tracing_subscriber::fmt()
        .with_env_filter(config.resolve_filter()?)
        .with_ansi(config.ansi)
        .with_target(config.include_targets)
        .with_span_events(span_events)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}
