//! Follower Core - Daemon Entry Point
//!
//! Reads one JSON observation per line from stdin, ingests it, and writes
//! the outcome as one JSON line to stdout. The retention sweeper runs in
//! the background until stdin closes.
//!
//! Observations that still fail on a transient store error after the
//! immediate retries wait in a bounded backlog and are replayed before each
//! new line and once more at end of input. A concurrency conflict stops the
//! daemon.
//!
//! Usage: `follower-core [config.json]`

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use follower_core::constants::{APP_NAME, APP_VERSION};
use follower_core::{
    EngineConfig, IngestError, IngestOutcome, IngestPipeline, Observation, RetentionSweeper, RetryBacklog,
    SqliteStore, Store,
};

/// Immediate attempts per observation before it goes to the backlog
const MAX_ATTEMPTS: u32 = 4;
const BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Backlog passes at end of input, with doubling pauses (~100 s total)
const DRAIN_ROUNDS: u32 = 10;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}", APP_NAME, APP_VERSION);

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let config = EngineConfig::resolve(config_path.as_deref().map(Path::new))?;

    let store = Arc::new(SqliteStore::open(config.database_path(), config.busy_timeout())?);
    let pipeline = Arc::new(IngestPipeline::new(store, config.clone())?);

    let sweeper = RetentionSweeper::new(pipeline.clone(), config.sweep_batch_size).spawn(
        config.sweep_interval(),
        config.device_ttl_ms(),
        config.sighting_ttl_ms(),
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut backlog = RetryBacklog::new(config.retry_backlog_capacity);
    let (mut accepted, mut rejected) = (0u64, 0u64);

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let observation: Observation = match serde_json::from_str(&line) {
            Ok(obs) => obs,
            Err(e) => {
                log::warn!("Skipping malformed observation: {}", e);
                rejected += 1;
                continue;
            }
        };

        if !backlog.is_empty() {
            let report = backlog.retry(|obs| pipeline.ingest(obs))?;
            accepted += report.ingested.len() as u64;
            rejected += report.dropped as u64;
            write_outcomes(&mut out, &report.ingested)?;
        }

        match ingest_with_retry(&pipeline, &observation) {
            Ok(outcome) => {
                accepted += 1;
                write_outcomes(&mut out, &[outcome])?;
            }
            // fatal; the sweeper handle stops on drop
            Err(e @ IngestError::ConcurrencyConflict(_)) => return Err(e.into()),
            Err(e) if e.is_transient() => {
                log::warn!("Holding observation for '{}' until the store recovers: {}", observation.device_id, e);
                if backlog.push(observation).is_some() {
                    rejected += 1;
                }
            }
            Err(e) => {
                log::warn!("Dropped observation for '{}': {}", observation.device_id, e);
                rejected += 1;
            }
        }
    }

    let mut delay = BACKOFF_BASE;
    for _ in 0..DRAIN_ROUNDS {
        if backlog.is_empty() {
            break;
        }
        let report = backlog.retry(|obs| pipeline.ingest(obs))?;
        accepted += report.ingested.len() as u64;
        rejected += report.dropped as u64;
        write_outcomes(&mut out, &report.ingested)?;
        if !backlog.is_empty() {
            thread::sleep(delay);
            delay *= 2;
        }
    }
    if !backlog.is_empty() {
        log::error!("Store still unavailable, {} queued observation(s) lost", backlog.len());
        rejected += backlog.len() as u64;
    }

    log::info!("Input closed ({} ingested, {} rejected)", accepted, rejected);
    sweeper.stop();
    Ok(())
}

/// Retry transient failures with exponential backoff. Conflicts are never retried.
fn ingest_with_retry<S: Store>(
    pipeline: &IngestPipeline<S>,
    observation: &Observation,
) -> Result<IngestOutcome, IngestError> {
    let mut attempt = 1;
    loop {
        match pipeline.ingest(observation) {
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                log::warn!("Ingest attempt {} failed ({}), retrying in {:?}", attempt, e, delay);
                thread::sleep(delay);
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn write_outcomes(out: &mut impl Write, outcomes: &[IngestOutcome]) -> Result<(), Box<dyn std::error::Error>> {
    for outcome in outcomes {
        writeln!(out, "{}", serde_json::to_string(outcome)?)?;
    }
    out.flush()?;
    Ok(())
}
