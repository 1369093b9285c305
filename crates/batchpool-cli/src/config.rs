use anyhow::bail;
use batchpool::PoolConfig;
use clap::Parser;
use core::time::Duration;

/// Upper bound on `--jobs`. The batch is built up front, so this also bounds
/// its memory.
pub const MAX_JOBS: u64 = 1_000_000;

/// Runtime configuration for the `batchpool` binary.
///
/// These settings size the worker pool, its retry policy, the run deadline,
/// and the shape of the sample batch. All values are parsed from CLI arguments
/// or environment variables (a `.env` file is honoured), with defaults that
/// reproduce a 20-job demo run.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "batchpool",
    version,
    about = "Runs a sample batch of jobs through a bounded, retrying worker pool"
)]
pub struct CliArgs {
    /// Number of workers processing jobs concurrently.
    ///
    /// Use `0` to size the pool to the number of logical CPUs.
    ///
    /// Environment variable: `WORKER_COUNT`
    #[arg(short, long, env = "WORKER_COUNT", default_value_t = 5)]
    pub workers: usize,

    /// Number of jobs buffered between the feeder and the workers.
    ///
    /// Lower values apply backpressure to the feeder sooner. `0` requests a
    /// hand-off queue.
    ///
    /// Environment variable: `QUEUE_SIZE`
    #[arg(long, env = "QUEUE_SIZE", default_value_t = 20)]
    pub queue_size: usize,

    /// Extra attempts granted to a job after its first failure.
    ///
    /// Environment variable: `MAX_RETRIES`
    #[arg(long, env = "MAX_RETRIES", default_value_t = 2)]
    pub max_retries: usize,

    /// Fixed pause between a failed attempt and the next one, in milliseconds.
    ///
    /// Environment variable: `RETRY_DELAY_MS`
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 200)]
    pub retry_delay_ms: u64,

    /// Deadline for the whole run, in seconds. Jobs still queued or in flight
    /// when it elapses are abandoned.
    ///
    /// Environment variable: `TIMEOUT_SECS`
    #[arg(long, env = "TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Number of jobs in the batch, at most 1,000,000. Job `n` squares the
    /// integer `n`.
    ///
    /// Environment variable: `JOB_COUNT`
    #[arg(short, long, env = "JOB_COUNT", default_value_t = 20)]
    pub jobs: u64,

    /// Simulated duration of every attempt, in milliseconds.
    ///
    /// Environment variable: `JOB_LATENCY_MS`
    #[arg(long, env = "JOB_LATENCY_MS", default_value_t = 300)]
    pub job_latency_ms: u64,

    /// Number of leading attempts of every job that fail on purpose, to
    /// exercise the retry path.
    ///
    /// Environment variable: `FAIL_FIRST`
    #[arg(long, env = "FAIL_FIRST", default_value_t = 0)]
    pub fail_first: usize,
}

/// Validated settings for one CLI run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pool: PoolConfig,
    pub timeout: Duration,
    pub jobs: u64,
    pub job_latency: Duration,
    pub fail_first: usize,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let workers = match args.workers {
            0 => num_cpus::get(),
            n => n,
        };

        if args.timeout_secs == 0 {
            bail!("TIMEOUT_SECS must be greater than 0");
        }

        if args.jobs == 0 {
            bail!("JOB_COUNT must be greater than 0");
        }

        if args.jobs > MAX_JOBS {
            bail!("JOB_COUNT ({}) exceeds the maximum of {MAX_JOBS}", args.jobs);
        }

        let pool = PoolConfig::new(
            workers,
            args.queue_size,
            args.max_retries,
            Duration::from_millis(args.retry_delay_ms),
        );
        pool.validate()?;

        Ok(Self {
            pool,
            timeout: Duration::from_secs(args.timeout_secs),
            jobs: args.jobs,
            job_latency: Duration::from_millis(args.job_latency_ms),
            fail_first: args.fail_first,
        })
    }
}
