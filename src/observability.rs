// Centralized Observability Infrastructure
// Structured logging, per-request tracing, and lightweight process counters
// for the portal service.

use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

// Global atomic counters for the metrics snapshot
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);
static SEARCH_COUNTER: AtomicU64 = AtomicU64::new(0);
static SETTINGS_WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize the logging and tracing infrastructure.
/// This should be called once at application startup.
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    // Determine the filter level based on flags
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("deskportal=debug,info")
    } else {
        // Default: warnings and errors for the portal, errors only for deps.
        // Users can widen this with --verbose or RUST_LOG.
        EnvFilter::new("deskportal=warn,error")
    };

    // Quiet takes precedence over RUST_LOG so --quiet always silences output
    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("deskportal observability initialized");
            }
            Ok(())
        }
        Err(_) => {
            // Already initialized, which is fine in test environments
            Ok(())
        }
    }
}

/// Identity and timing for one in-flight request. Exists only for the
/// request's lifetime; never persisted.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub operation: String,
    start: Instant,
}

impl RequestContext {
    pub fn new(operation: impl Into<String>) -> Self {
        REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            request_id: Uuid::new_v4().to_string(),
            operation: operation.into(),
            start: Instant::now(),
        }
    }

    /// Elapsed wall-clock time in milliseconds. All durations surfaced to
    /// callers use this unit.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Execute a fallible async operation under a request id, logging start,
/// completion, and failure with consistent fields.
pub async fn with_request_id<F, T>(operation: &str, f: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let ctx = RequestContext::new(operation);
    info!(
        request_id = %ctx.request_id,
        "Starting operation: {}", operation
    );

    let result = f.await;
    let elapsed_ms = ctx.elapsed_ms();

    match &result {
        Ok(_) => {
            info!(
                request_id = %ctx.request_id,
                elapsed_ms,
                "Operation completed: {}", operation
            );
        }
        Err(e) => {
            error!(
                request_id = %ctx.request_id,
                elapsed_ms,
                error = %e,
                "Operation failed: {}", operation
            );
            ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
    }

    result
}

/// Count an executed search against the host engine.
pub fn record_search() {
    SEARCH_COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// Count a persisted settings write.
pub fn record_settings_write() {
    SETTINGS_WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// Count a failed request.
pub fn record_error() {
    ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// Current process counters as JSON.
pub fn metrics_snapshot() -> serde_json::Value {
    serde_json::json!({
        "requests": {
            "total": REQUEST_COUNTER.load(Ordering::Relaxed),
            "errors": ERROR_COUNTER.load(Ordering::Relaxed),
            "searches": SEARCH_COUNTER.load(Ordering::Relaxed),
            "settings_writes": SETTINGS_WRITE_COUNTER.load(Ordering::Relaxed),
        },
        "timestamp": Utc::now().to_rfc3339(),
    })
}
