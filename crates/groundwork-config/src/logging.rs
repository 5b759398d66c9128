//! Logging initialization.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::{AppConfig, LogFormat};

/// Initialize the tracing subscriber.
///
/// A `RUST_LOG` directive set in the environment replaces the configured
/// level filter entirely; `LOG_FORMAT` (json, pretty) overrides the
/// configured format. Logs always go to stderr so stdout stays clean for
/// whatever the embedding process emits there.
pub fn initialize(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let base = fmt::layer().with_writer(std::io::stderr);
    let output = match resolve_format(config) {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
    };

    tracing_subscriber::registry().with(filter).with(output).init();
}

/// The configured format, unless `LOG_FORMAT` says otherwise.
fn resolve_format(config: &AppConfig) -> LogFormat {
    let env_override = std::env::var("LOG_FORMAT")
        .ok()
        .map(|v| v.to_ascii_lowercase());
    match env_override.as_deref() {
        Some("json") => LogFormat::Json,
        Some("pretty" | "human") => LogFormat::Pretty,
        _ => config.logging.format.clone(),
    }
}
