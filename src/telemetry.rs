//! Telemetry and Observability
//!
//! Structured logging to a rolling JSON file and the console, optionally
//! mirrored to Sentry.

use std::time::Duration;

use sentry::integrations::tracing::EventFilter;
use sentry::protocol::{Context, Map, Value};
use sentry::types::Uuid;
use tracing::{Level, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::{LogRotation, LogSettings, SentrySettings};
use crate::shared::{generate_request_id, KitError, KitResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Owns the background writer and the Sentry client.
///
/// Dropping the logger flushes pending file writes and shuts the Sentry
/// transport down.
pub struct Logger {
    file_guard: Option<WorkerGuard>,
    sentry_guard: Option<sentry::ClientInitGuard>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("file", &self.file_guard.is_some())
            .field("error_reporting", &self.is_error_reporting_enabled())
            .finish()
    }
}

impl Logger {
    /// A logger that owns nothing; log records go to whatever subscriber is installed.
    pub fn disabled() -> Self {
        Self {
            file_guard: None,
            sentry_guard: None,
        }
    }

    pub fn is_error_reporting_enabled(&self) -> bool {
        self.sentry_guard.as_ref().is_some_and(|g| g.is_enabled())
    }

    /// Send an error to Sentry as an exception event.
    pub fn capture_error(&self, err: &(dyn std::error::Error + 'static)) {
        tracing::error!(error = %err, "Captured error");
        if self.is_error_reporting_enabled() {
            sentry::capture_error(err);
        }
    }

    /// Send a plain message event at `level`. Returns the event id when
    /// error reporting is enabled.
    pub fn capture_message(&self, message: &str, level: sentry::Level) -> Option<Uuid> {
        if !self.is_error_reporting_enabled() {
            tracing::debug!(message, ?level, "Error reporting disabled, message dropped");
            return None;
        }
        Some(sentry::capture_message(message, level))
    }

    /// Tag every later event from this thread's hub.
    pub fn set_tag(&self, key: &str, value: impl ToString) {
        self.configure_scope(|scope| scope.set_tag(key, value));
    }

    pub fn set_tags<I, K, V>(&self, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        self.configure_scope(|scope| {
            for (key, value) in tags {
                scope.set_tag(key.as_ref(), value);
            }
        });
    }

    pub fn set_extra(&self, key: &str, value: Value) {
        self.configure_scope(|scope| scope.set_extra(key, value));
    }

    pub fn set_user(&self, user: Option<sentry::User>) {
        self.configure_scope(|scope| scope.set_user(user));
    }

    /// Attach a free-form context object under `key`.
    pub fn set_context(&self, key: &str, values: Map<String, Value>) {
        self.configure_scope(|scope| scope.set_context(key, Context::Other(values)));
    }

    /// Run `f` with a scope configured only for events it captures.
    pub fn with_scope<C, F, R>(&self, configure: C, f: F) -> R
    where
        C: FnOnce(&mut sentry::Scope),
        F: FnOnce() -> R,
    {
        if self.is_error_reporting_enabled() {
            sentry::with_scope(configure, f)
        } else {
            f()
        }
    }

    fn configure_scope<F>(&self, f: F)
    where
        F: FnOnce(&mut sentry::Scope),
    {
        if self.is_error_reporting_enabled() {
            sentry::configure_scope(f);
        }
    }

    /// Wait up to `timeout` for queued Sentry events to be sent.
    pub fn flush(&self, timeout: Duration) -> bool {
        if !self.is_error_reporting_enabled() {
            return true;
        }
        sentry::Hub::current()
            .client()
            .map(|client| client.flush(Some(timeout)))
            .unwrap_or(true)
    }

    pub fn close(self, timeout: Duration) {
        if !self.flush(timeout) {
            tracing::warn!(?timeout, "Sentry flush timed out");
        }
    }
}

/// Build the level filter; `RUST_LOG` wins over the configured level.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

fn file_output_enabled(log: &LogSettings) -> bool {
    !log.directory.is_empty() && !log.filename.is_empty()
}

fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> EventFilter {
    match *metadata.level() {
        Level::ERROR | Level::WARN => EventFilter::Event,
        Level::INFO => EventFilter::Breadcrumb,
        _ => EventFilter::Ignore,
    }
}

/// Initialize the Sentry client, returning `None` when reporting is off.
fn init_sentry(settings: &SentrySettings) -> KitResult<Option<sentry::ClientInitGuard>> {
    if !settings.enabled {
        return Ok(None);
    }
    if settings.dsn.trim().is_empty() {
        return Err(KitError::Telemetry(
            "sentry is enabled but no dsn is configured".into(),
        ));
    }

    let dsn: sentry::types::Dsn = settings
        .dsn
        .parse()
        .map_err(|e| KitError::Telemetry(format!("invalid sentry dsn: {e}")))?;

    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        environment: Some(settings.environment.clone().into()),
        debug: settings.debug,
        sample_rate: settings.sample_rate,
        traces_sample_rate: settings.traces_sample_rate,
        attach_stacktrace: true,
        ..Default::default()
    });

    Ok(Some(guard))
}

/// Install the global subscriber.
///
/// Installing twice keeps the first subscriber; the returned logger still
/// owns its own writer and Sentry client.
pub fn init_logger(log: &LogSettings, sentry_settings: &SentrySettings) -> KitResult<Logger> {
    let file_enabled = file_output_enabled(log);
    if !file_enabled && !log.stdout {
        return Err(KitError::Telemetry("no log output configured".into()));
    }

    let sentry_guard = init_sentry(sentry_settings)?;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let file_guard = if file_enabled {
        std::fs::create_dir_all(&log.directory)?;

        let max_files = if log.max_files == 0 { 10 } else { log.max_files };
        let appender = RollingFileAppender::builder()
            .rotation(rotation(log.rotation))
            .filename_prefix(&log.filename)
            .max_log_files(max_files)
            .build(&log.directory)
            .map_err(|e| KitError::Telemetry(format!("failed to open log file: {e}")))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        layers.push(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .boxed(),
        );
        Some(guard)
    } else {
        None
    };

    if log.stdout {
        let console = fmt::layer().with_target(true).with_thread_ids(true);
        if log.json {
            layers.push(console.json().boxed());
        } else {
            layers.push(console.with_file(true).with_line_number(true).boxed());
        }
    }

    if sentry_guard.is_some() {
        layers.push(
            sentry::integrations::tracing::layer()
                .event_filter(sentry_event_filter)
                .boxed(),
        );
    }

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(&log.level))
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            level = %log.level,
            file = file_enabled,
            sentry = sentry_guard.is_some(),
            "Logger initialized"
        );
    } else {
        tracing::debug!("Global subscriber already installed, keeping it");
    }

    Ok(Logger {
        file_guard,
        sentry_guard,
    })
}

/// A span carrying the request id; a fresh id is generated when empty.
pub fn request_span(request_id: &str) -> Span {
    let request_id = if request_id.is_empty() {
        generate_request_id()
    } else {
        request_id.to_string()
    };
    tracing::info_span!("request", request_id = %request_id)
}
