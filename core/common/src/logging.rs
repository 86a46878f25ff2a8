// core/common/src/logging.rs
// Structured JSON logging with run and rank correlation

use tracing::{error, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use uuid::Uuid;

/// Initialize structured logging for a tool
pub fn init_logging(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
        )
        .init();

    info!(
        service = service_name,
        "Logging initialized"
    );
}

/// Initialize simple console logging (for development)
pub fn init_console_logging(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .pretty()
                .with_target(true)
        )
        .init();

    info!(
        service = service_name,
        "Console logging initialized"
    );
}

/// Generate a correlation ID for a run
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Context for structured logging
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub rank: Option<usize>,
    pub artifact: Option<String>,
}

impl LogContext {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            rank: None,
            artifact: None,
        }
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_artifact(mut self, artifact: String) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

/// Macro for logging with context
#[macro_export]
macro_rules! log_with_context {
    ($level:expr, $ctx:expr, $($arg:tt)*) => {
        match $level {
            tracing::Level::ERROR => tracing::error!(
                run_id = %$ctx.run_id,
                rank = ?$ctx.rank,
                artifact = ?$ctx.artifact,
                $($arg)*
            ),
            tracing::Level::WARN => tracing::warn!(
                run_id = %$ctx.run_id,
                rank = ?$ctx.rank,
                artifact = ?$ctx.artifact,
                $($arg)*
            ),
            tracing::Level::INFO => tracing::info!(
                run_id = %$ctx.run_id,
                rank = ?$ctx.rank,
                artifact = ?$ctx.artifact,
                $($arg)*
            ),
            tracing::Level::DEBUG => tracing::debug!(
                run_id = %$ctx.run_id,
                rank = ?$ctx.rank,
                artifact = ?$ctx.artifact,
                $($arg)*
            ),
            _ => tracing::trace!(
                run_id = %$ctx.run_id,
                rank = ?$ctx.rank,
                artifact = ?$ctx.artifact,
                $($arg)*
            ),
        }
    };
}

/// Log a successful operation
pub fn log_success(ctx: &LogContext, action: &str, details: Option<&str>) {
    info!(
        run_id = %ctx.run_id,
        rank = ?ctx.rank,
        artifact = ?ctx.artifact,
        action = action,
        details = ?details,
        "Operation successful"
    );
}

/// Log a failed operation
pub fn log_failure(ctx: &LogContext, action: &str, error: &str) {
    error!(
        run_id = %ctx.run_id,
        rank = ?ctx.rank,
        artifact = ?ctx.artifact,
        action = action,
        error = error,
        "Operation failed"
    );
}
