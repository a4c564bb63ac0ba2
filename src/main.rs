use anyhow::{Context, Result, anyhow};
use clap::Parser;
use shardctl::{
    AdminSession, BootstrapConfig, ClusterBootstrapper, ControlPlane, HttpControlPlane,
    InMemoryControlPlane, RunReport, Topology, render_topology_summary,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit code when the run could not start at all.
const EXIT_STARTUP_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "shardctl")]
#[command(about = "Idempotently configures shards, partitioning, shard keys and indexes")]
struct Cli {
    /// Command gateway of the cluster router
    #[arg(long, default_value = "http://mongos:8080")]
    endpoint: String,

    /// Topology file to apply instead of the embedded banking topology
    #[arg(long)]
    topology: Option<PathBuf>,

    /// Fixed wait before the first readiness ping
    #[arg(long, default_value_t = 5)]
    initial_wait_secs: u64,

    /// Per-command timeout; unset lets the endpoint decide
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Run against a fresh in-memory cluster instead of the endpoint
    #[arg(long)]
    simulate: bool,

    /// Number of consecutive runs (only with --simulate)
    #[arg(long, default_value_t = 1, requires = "simulate")]
    runs: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(report) => ExitCode::from(report.exit_code() as u8),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<RunReport> {
    let topology = match &cli.topology {
        Some(path) => Topology::from_file(path)
            .with_context(|| format!("Failed to load topology '{}'", path.display()))?,
        None => Topology::banking().context("Embedded topology is invalid")?,
    };
    let plan = topology.to_plan().context("Topology does not form a valid plan")?;

    let mut config = BootstrapConfig::from_url(&cli.endpoint)
        .map_err(|e| anyhow!("Invalid endpoint '{}': {}", cli.endpoint, e))?
        .initial_wait(Duration::from_secs(cli.initial_wait_secs));
    if let Some(secs) = cli.request_timeout_secs {
        config = config.request_timeout(Duration::from_secs(secs));
    }
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let plane: Arc<dyn ControlPlane> = if cli.simulate {
        println!("Simulating against an in-memory cluster ({} run(s))", cli.runs);
        config = config.initial_wait(Duration::ZERO);
        Arc::new(InMemoryControlPlane::new())
    } else {
        Arc::new(HttpControlPlane::new(&config).context("Failed to build control plane client")?)
    };

    let bootstrapper = ClusterBootstrapper::new(topology.failure_policy)
        .with_observer(|result| println!("{}", result.line()));

    let mut session = AdminSession::open(plane, &config)
        .await
        .with_context(|| format!("Control plane at {} is not ready", config.to_url()))?;

    let mut report = None;
    for run_number in 1..=cli.runs.max(1) {
        if cli.runs > 1 {
            println!("--- run {run_number} ---");
        }
        let current = bootstrapper.run(&mut session, &plan).await;
        println!("{}", current.headline());
        let aborted = current.aborted;
        report = Some(current);
        if aborted {
            break;
        }
    }
    session.close();

    print!("{}", render_topology_summary(&topology));
    report.ok_or_else(|| anyhow!("no bootstrap run was executed"))
}
