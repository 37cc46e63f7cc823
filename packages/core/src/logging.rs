use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Default directives when `RUST_LOG` is unset or unparsable. lettre logs
/// every SMTP exchange at debug, so it is held at warn.
pub const DEFAULT_FILTER: &str = "info,lettre=warn";

/// Build the filter from a `RUST_LOG`-style string, falling back to
/// [`DEFAULT_FILTER`] when it is missing, blank or invalid.
pub fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize structured logging for the circulation service.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let installed = fmt()
        .with_env_filter(build_filter(directives.as_deref()))
        .with_target(false)
        .compact()
        .try_init()
        .is_ok();

    if installed {
        info!("Logging initialized");
    }
}
