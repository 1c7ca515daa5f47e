// blockperf-agent: node-side telemetry agent for Cardano block propagation
// and peer connection observability.

use blockperf_agent::cli::{Cli, Command};
use blockperf_agent::config::{self, LogSourceConfig};
use blockperf_agent::correlator::Correlator;
use blockperf_agent::logsource::{file_tail::FileTailSource, journal::JournalSource, LogSource};
use blockperf_agent::metrics::PeerCounterGauges;
use blockperf_agent::peers::PeerTracker;
use blockperf_agent::scheduler::{ScheduleIntervals, Scheduler};
use blockperf_agent::submit::Submitter;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(run(cli));
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Version => {
            println!("blockperf-agent {}", env!("CARGO_PKG_VERSION"));
            0
        }
        Command::Run => run_agent().await,
        Command::Register {
            pool_id,
            calidus_skey,
            network: _,
            api_url,
        } => {
            let base_url = api_url.unwrap_or_else(|| "https://api.openblockperf.cardano.org".to_owned());
            match blockperf_agent::registration::register(&pool_id, &calidus_skey, &base_url).await {
                Ok(key) => {
                    println!("Your new Api key is {key}");
                    0
                }
                Err(e) => {
                    eprintln!("registration failed: {e}");
                    1
                }
            }
        }
    }
}

async fn run_agent() -> i32 {
    let cfg = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            return 1;
        }
    };

    info!(
        network = %cfg.network.name,
        api_base_url = %cfg.api_base_url(),
        "blockperf-agent starting"
    );

    let source = match &cfg.log_source {
        LogSourceConfig::Journal { unit } => LogSource::Journal(JournalSource::new(unit.clone())),
        LogSourceConfig::FileTail { path } => LogSource::FileTail(FileTailSource::new(path.clone())),
    };

    let correlator = Arc::new(Correlator::new(
        cfg.network.genesis_start_unix,
        Duration::from_secs(cfg.min_age_secs),
        Duration::from_secs(10 * 60),
        cfg.local_endpoint(),
        cfg.network.magic,
        cfg.client_version.clone(),
    ));
    let peers = Arc::new(PeerTracker::new(cfg.local_port));
    let metrics = Arc::new(PeerCounterGauges::new());

    let submitter = match Submitter::new(cfg.api_base_url(), cfg.api_key.clone(), cfg.api_client_id.clone()) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("FATAL: failed to build submitter: {e}");
            return 1;
        }
    };

    let intervals = ScheduleIntervals {
        check_interval: Duration::from_secs(cfg.check_interval_secs),
        min_age: Duration::from_secs(cfg.min_age_secs),
        ..ScheduleIntervals::default()
    };

    let scheduler = Arc::new(Scheduler::new(
        correlator,
        peers,
        submitter,
        metrics,
        intervals,
        cfg.clear_peers_on_restart,
    ));

    // Run the four activities as a separate task so that signalling
    // shutdown doesn't drop (and thereby cancel mid-cleanup) the future
    // that's supposed to observe it: `tokio::select!` would otherwise tear
    // down `scheduler.run` the instant the shutdown branch resolves, before
    // `run_ingestion` gets a chance to see the notification and close the
    // log source.
    let run_scheduler = scheduler.clone();
    let mut run_task = tokio::spawn(async move { run_scheduler.run(source).await });

    const SHUTDOWN_AWAIT_TIMEOUT: Duration = Duration::from_secs(5);

    tokio::select! {
        result = &mut run_task => report_run_result(result),
        _ = scheduler.wait_for_shutdown_signal() => {
            match tokio::time::timeout(SHUTDOWN_AWAIT_TIMEOUT, run_task).await {
                Ok(result) => report_run_result(result),
                Err(_) => {
                    error!("activities did not finish within the shutdown grace period, forcing exit");
                    1
                }
            }
        }
    }
}

fn report_run_result(
    result: Result<Result<(), blockperf_agent::scheduler::TaskError>, tokio::task::JoinError>,
) -> i32 {
    match result {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!(error = %e, "fatal scheduler error");
            1
        }
        Err(e) => {
            error!(error = %e, "scheduler task panicked");
            1
        }
    }
}
