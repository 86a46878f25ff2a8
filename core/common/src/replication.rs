// core/common/src/replication.rs
// Checks that an artifact uploaded by rank zero becomes readable on every rank

use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::coordination::ProcessGroup;
use crate::error::ArtifactError;
use crate::logging::{generate_run_id, log_failure, log_success, LogContext};
use crate::metrics::MetricsTimer;
use crate::retry::{Retrier, RetryPolicy, Sleeper, ThreadSleeper};
use crate::store::{ArtifactStore, RemoteLogger};

/// Six attempts wait at most 1+2+4+8+16 seconds before giving up.
pub const DEFAULT_REPLICATION_ATTEMPTS: u32 = 6;

const UPLOAD_FILE_NAME: &str = "artifact.txt";
const DOWNLOAD_FILE_NAME: &str = "downloaded_artifact";

pub fn new_artifact_name() -> String {
    format!("test-artifact-{}", Uuid::new_v4())
}

pub fn default_replication_policy() -> RetryPolicy {
    RetryPolicy::new(DEFAULT_REPLICATION_ATTEMPTS, Duration::from_secs(1))
}

pub struct ReplicationCheck<S, Sl = ThreadSleeper> {
    logger: Arc<RemoteLogger<S>>,
    retrier: Retrier<Sl>,
    scratch_dir: PathBuf,
    run_id: String,
}

impl<S: ArtifactStore> ReplicationCheck<S, ThreadSleeper> {
    pub fn new(logger: Arc<RemoteLogger<S>>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self::with_retrier(
            logger,
            Retrier::new(default_replication_policy()),
            scratch_dir,
        )
    }
}

impl<S: ArtifactStore, Sl: Sleeper> ReplicationCheck<S, Sl> {
    pub fn with_retrier(
        logger: Arc<RemoteLogger<S>>,
        retrier: Retrier<Sl>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            logger,
            retrier,
            scratch_dir: scratch_dir.into(),
            run_id: generate_run_id(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Agrees on rank zero's artifact name, uploads `expected` from rank zero,
    /// waits at the barrier and then polls until every rank reads `expected` back.
    /// Returns the agreed artifact name.
    pub fn verify<G: ProcessGroup>(
        &self,
        group: &G,
        proposed_name: &str,
        expected: &str,
    ) -> Result<String, ArtifactError> {
        let rank = group.rank();

        let mut names = vec![proposed_name.to_string()];
        group.broadcast(&mut names, 0)?;
        let name = names
            .into_iter()
            .next()
            .ok_or_else(|| ArtifactError::Coordination("empty artifact name broadcast".to_string()))?;

        let ctx = LogContext::new(self.run_id.clone())
            .with_rank(rank)
            .with_artifact(name.clone());

        let rank_dir = self.scratch_dir.join(format!("rank-{}", rank));
        let prepared = fs::create_dir_all(&rank_dir).map_err(|e| ArtifactError::from_io(&rank_dir, e));

        // Rank zero still reaches the barrier on failure so the others are not stranded.
        let uploaded = match (&prepared, rank) {
            (Ok(()), 0) => self.upload(&rank_dir, &name, expected),
            _ => Ok(()),
        };

        group.barrier();
        prepared?;
        if let Err(e) = uploaded {
            crate::log_with_context!(
                tracing::Level::ERROR,
                ctx,
                error_code = e.error_code(),
                "Artifact upload failed; other ranks will not find it"
            );
            return Err(e);
        }
        crate::log_with_context!(tracing::Level::DEBUG, ctx, "Passed upload barrier");

        let destination = rank_dir.join(DOWNLOAD_FILE_NAME);
        let timer = MetricsTimer::new();
        let attempts = Cell::new(0u32);

        let result = self.retrier.run_retryable(|| {
            attempts.set(attempts.get() + 1);
            if attempts.get() > 1 {
                crate::log_with_context!(
                    tracing::Level::DEBUG,
                    ctx,
                    attempt = attempts.get(),
                    "Artifact not readable yet, retrying"
                );
                if let Some(metrics) = self.logger.metrics() {
                    metrics.record_retry();
                }
            }

            self.logger.download_file(&name, &destination)?;
            let actual = fs::read_to_string(&destination)
                .map_err(|e| ArtifactError::from_io(&destination, e))?;
            if actual != expected {
                return Err(ArtifactError::Mismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
            Ok(())
        });

        if let Some(metrics) = self.logger.metrics() {
            let status = match &result {
                Ok(()) => "success",
                Err(e) => e.error_code(),
            };
            metrics.record_download_duration(status, timer.elapsed_seconds());
        }

        match result {
            Ok(()) => {
                let details = format!("readable after {} attempt(s)", attempts.get());
                log_success(&ctx, "verify", Some(&details));
                Ok(name)
            }
            Err(e) => {
                log_failure(&ctx, "verify", &e.to_string());
                Err(e)
            }
        }
    }

    fn upload(&self, rank_dir: &std::path::Path, name: &str, contents: &str) -> Result<(), ArtifactError> {
        let source = rank_dir.join(UPLOAD_FILE_NAME);
        fs::write(&source, contents).map_err(|e| ArtifactError::from_io(&source, e))?;
        if !self.logger.upload_file(0, &source, name)? {
            return Err(ArtifactError::UploadSkipped(name.to_string()));
        }
        Ok(())
    }
}
