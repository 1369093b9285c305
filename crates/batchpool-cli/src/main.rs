#![doc = include_str!("../README.md")]

mod config;
mod job;
mod report;
mod telemetry;

use batchpool::{CancellationToken, Pool, with_deadline};
use clap::Parser;
use config::{CliArgs, RunConfig};
use job::SquareJob;
use std::time::Instant;
use telemetry::{init_telemetry, record_run};
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    let providers = init_telemetry()?;
    let res = run(config).await;
    providers.shutdown();
    res
}

async fn run(config: RunConfig) -> anyhow::Result<()> {
    log_startup_info(&config);

    let root = CancellationToken::new();
    tokio::spawn(shutdown_signal(root.clone()));
    let cancel = with_deadline(&root, config.timeout);

    let pool = Pool::new(config.pool.clone())?;
    let jobs: Vec<u64> = (1..=config.jobs).collect();
    let job_count = jobs.len();
    let square = SquareJob::new(config.job_latency, config.fail_first);

    let started = Instant::now();
    let results = pool
        .run(&cancel, jobs, move |cancel, n| {
            let square = square.clone();
            async move { square.run(cancel, n).await }
        })
        .await?;
    let elapsed = started.elapsed();

    // Stop the deadline timer and the signal listener.
    root.cancel();

    report::print_results(std::io::stdout().lock(), job_count, &results)?;

    let counts = report::summarize(job_count, &results);
    record_run(counts, elapsed.as_secs_f64() * 1000.0);

    if counts.abandoned > 0 {
        tracing::warn!(
            succeeded = counts.succeeded,
            failed = counts.failed,
            abandoned = counts.abandoned,
            elapsed_ms = elapsed.as_millis() as u64,
            "Run cut short; {} of {} jobs produced no result",
            counts.abandoned,
            counts.submitted
        );
    } else {
        tracing::info!(
            succeeded = counts.succeeded,
            failed = counts.failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Run complete"
        );
    }
    Ok(())
}

fn log_startup_info(config: &RunConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting run with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting run of {} jobs on {} workers (deadline {:?})",
            config.jobs,
            config.pool.worker_count,
            config.timeout
        );
    }
}

/// Cancels `token` on Ctrl+C or SIGTERM. Returns early if the token is
/// cancelled by someone else first.
async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = token.cancelled() => return,
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, cancelling run...");
    token.cancel();
}
