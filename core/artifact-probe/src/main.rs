// core/artifact-probe/src/main.rs
// Artifact Probe: checks that artifacts uploaded by rank zero reach every rank

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use prometheus::{Encoder, Registry, TextEncoder};
use runlog_common::{
    generate_run_id, init_console_logging, init_logging, new_artifact_name, ArtifactError,
    ArtifactMetrics, InMemoryLogger, LocalArtifactStore, LocalGroup, LogFormat, LogPayload,
    MetricsTimer, ProbeConfig, ProcessGroup, RemoteLogger, RemoteLoggerOptions, ReplicationCheck,
    Retrier, Timestamp,
};
use std::sync::Arc;
use std::thread;

const SERVICE_NAME: &str = "artifact-probe";
const PROBE_CONTENTS: &str = "hello!";

// ============================================================================
// RANK RESULTS
// ============================================================================

struct RankOutcome {
    rank: usize,
    elapsed_seconds: f64,
    result: Result<String, ArtifactError>,
}

fn run_ranks(
    config: &ProbeConfig,
    logger: Arc<RemoteLogger<LocalArtifactStore>>,
    run_id: &str,
) -> Result<Vec<RankOutcome>> {
    let scratch = config.artifact_dir.join("scratch").join(run_id);

    let handles: Vec<_> = LocalGroup::create(config.world_size)
        .into_iter()
        .map(|group| {
            let logger = Arc::clone(&logger);
            let retrier = Retrier::new(config.retry_policy());
            let scratch = scratch.clone();
            let run_id = run_id.to_string();

            thread::Builder::new()
                .name(format!("rank-{}", group.rank()))
                .spawn(move || {
                    let timer = MetricsTimer::new();
                    let check = ReplicationCheck::with_retrier(logger, retrier, scratch)
                        .with_run_id(run_id);
                    let result = check.verify(&group, &new_artifact_name(), PROBE_CONTENTS);
                    RankOutcome {
                        rank: group.rank(),
                        elapsed_seconds: timer.elapsed_seconds(),
                        result,
                    }
                })
        })
        .collect::<std::io::Result<_>>()
        .context("Failed to spawn rank threads")?;

    handles
        .into_iter()
        .map(|handle| {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("rank thread panicked"))
        })
        .collect()
}

fn record_outcomes(recorder: &mut InMemoryLogger, outcomes: &[RankOutcome]) {
    for outcome in outcomes {
        let timestamp = Timestamp::new(0, 0);
        recorder.log_metrics(
            timestamp.clone(),
            [
                ("probe/rank", outcome.rank as f64),
                ("probe/verify_seconds", outcome.elapsed_seconds),
            ],
        );

        let summary = match &outcome.result {
            Ok(name) => serde_json::json!({ "rank": outcome.rank, "artifact": name, "status": "ok" }),
            Err(e) => serde_json::json!({
                "rank": outcome.rank,
                "status": e.error_code(),
                "error": e.to_string(),
            }),
        };
        recorder.log("probe/summary", timestamp, LogPayload::Hyperparameters(summary));
    }
}

fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    let config = ProbeConfig::from_env().context("Invalid probe configuration")?;

    match config.log_format {
        LogFormat::Json => init_logging(SERVICE_NAME),
        LogFormat::Console => init_console_logging(SERVICE_NAME),
    }

    println!("🔎 runlog - Artifact Probe Starting...");
    tracing::info!(
        environment = ?config.environment,
        world_size = config.world_size,
        max_attempts = config.max_attempts,
        artifact_dir = %config.artifact_dir.display(),
        "Probe configured"
    );

    // Prometheus metrics
    let registry = Registry::new();
    let metrics = ArtifactMetrics::new(&registry, "artifact_probe")
        .context("Failed to create artifact metrics")?;

    let store = LocalArtifactStore::new(config.artifact_dir.join("remote"));
    let logger = Arc::new(
        RemoteLogger::new(
            store,
            RemoteLoggerOptions {
                rank_zero_only: config.rank_zero_only,
                log_artifacts: true,
            },
        )
        .with_metrics(metrics),
    );

    let run_id = generate_run_id();
    let outcomes = run_ranks(&config, logger, &run_id)?;

    let mut recorder = InMemoryLogger::new();
    record_outcomes(&mut recorder, &outcomes);
    recorder
        .check_json_serializable()
        .context("Probe records are not JSON serializable")?;

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    tracing::debug!(metrics = %String::from_utf8_lossy(&buffer), "Probe metrics");

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(name) => println!(
                "✅ rank {}: {} readable after {:.3}s",
                outcome.rank, name, outcome.elapsed_seconds
            ),
            Err(e) => {
                failed += 1;
                println!("❌ rank {}: {}", outcome.rank, e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} ranks could not read the artifact", failed, outcomes.len());
    }

    tracing::info!(run_id = %run_id, records = recorder.len(), "Probe finished");
    Ok(())
}
