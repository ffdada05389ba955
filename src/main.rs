use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ballast::backend::LocalProcessBackend;
use ballast::config::{RetryConfig, SchedulerConfig};
use ballast::scheduler::Scheduler;
use ballast::shutdown::install_shutdown_handler;
use ballast::source::{load_workflow, StaticDagSource};

#[derive(Parser, Debug)]
#[command(name = "ballast")]
#[command(version)]
#[command(about = "A resource-bounded concurrent job scheduler")]
struct Args {
    /// Path to a JSON workflow file (array of jobs with name, cpu, ram_mb,
    /// command, depends_on)
    #[arg(long)]
    jobs: PathBuf,

    /// Total CPU budget across all running jobs
    #[arg(long, default_value = "4")]
    max_cpu: u32,

    /// Total RAM budget across all running jobs, in megabytes
    #[arg(long, default_value = "8192")]
    max_ram_mb: u64,

    /// Cap on concurrently running jobs, independent of the resource budget
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Write a JSON usage report (samples plus peaks) to this path
    #[arg(long)]
    usage_report: Option<PathBuf>,

    /// Control-loop poll interval in milliseconds
    #[arg(long, default_value = "100")]
    poll_interval_ms: u64,

    /// Attempts before a transient backend failure fails the job
    #[arg(long, default_value = "3")]
    retry_attempts: u32,

    /// Backoff between backend retries in milliseconds
    #[arg(long, default_value = "500")]
    retry_backoff_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    std::process::exit(run(args).await);
}

async fn run(args: Args) -> i32 {
    let jobs = match load_workflow(&args.jobs) {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!(path = %args.jobs.display(), error = %e, "Failed to load workflow");
            return 1;
        }
    };
    tracing::info!(path = %args.jobs.display(), jobs = jobs.len(), "Workflow loaded");

    let mut source = match StaticDagSource::new(jobs) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, "Invalid workflow");
            return 1;
        }
    };

    let mut config = SchedulerConfig::new(args.max_cpu, args.max_ram_mb)
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms));
    config.max_parallel_jobs = args.max_parallel;
    config.usage_report_path = args.usage_report;
    config.retry = RetryConfig {
        max_attempts: args.retry_attempts,
        backoff: Duration::from_millis(args.retry_backoff_ms),
    };

    let shutdown = install_shutdown_handler();
    let backend = LocalProcessBackend::new();
    let mut scheduler = Scheduler::with_shutdown(config, shutdown.token());

    let summary = match scheduler.run(&mut source, &backend).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "Scheduler aborted");
            return 1;
        }
    };

    if let Some(signo) = shutdown.received_signal() {
        // Standard convention for signal-triggered termination.
        return 128 + signo;
    }
    if summary.failed > 0 || source.has_failures() {
        return 1;
    }
    0
}
