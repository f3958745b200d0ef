use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "solspot=info";

/// Open `path` for appending, creating it if needed
pub fn open_log_file(path: &Path) -> std::io::Result<Arc<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}

/// Plain-text fmt layer writing to a shared file handle
pub fn file_layer<S>(file: Arc<File>) -> fmt::Layer<S, DefaultFields, Format, Arc<File>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer().with_ansi(false).with_writer(file)
}

/// Install the global subscriber: console always, plus `log_file` when given
///
/// `RUST_LOG` overrides the default filter. A log file that cannot be opened
/// is reported on the console and skipped.
pub fn init(log_file: Option<&Path>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let mut open_error = None;
    let file = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(file),
        Err(e) => {
            open_error = Some((path.display().to_string(), e));
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file.map(file_layer))
        .init();

    match (open_error, log_file) {
        (Some((path, e)), _) => tracing::warn!("⚠️  Cannot open log file {}: {}", path, e),
        (None, Some(path)) => tracing::info!("📝 Logging to {}", path.display()),
        (None, None) => {}
    }
}
