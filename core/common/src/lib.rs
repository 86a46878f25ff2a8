// core/common/src/lib.rs
// runlog common library - retry, artifact storage and run recording

pub mod config;
pub mod coordination;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod recorder;
pub mod replication;
pub mod retry;
pub mod store;

// Re-export commonly used items
pub use config::{Environment, LogFormat, ProbeConfig};
pub use coordination::{LocalGroup, ProcessGroup};
pub use error::{ArtifactError, ConfigError, RecorderError};
pub use logging::{generate_run_id, init_console_logging, init_logging, log_failure, log_success, LogContext};
pub use metrics::{ArtifactMetrics, MetricsTimer};
pub use recorder::{InMemoryLogger, LogPayload, Timestamp};
pub use replication::{default_replication_policy, new_artifact_name, ReplicationCheck, DEFAULT_REPLICATION_ATTEMPTS};
pub use retry::{retry, retry_with_backoff, RecordingSleeper, Retrier, RetryPolicy, Retryable, Sleeper, ThreadSleeper};
pub use store::{validate_remote_name, ArtifactStore, LocalArtifactStore, RemoteLogger, RemoteLoggerOptions};
