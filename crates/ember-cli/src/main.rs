//! ember — ephemeral compute cluster lifecycle.
//!
//! Three entry points share one config file:
//! - `spawn` brings a cluster up (or returns the one already running),
//! - `delete` tears it down and waits for the operation,
//! - `watchdog` runs on the node itself and deletes the cluster after a
//!   full idle grace period.
//!
//! # Usage
//!
//! ```text
//! ember spawn --name etl-1 --project my-project --zone us-central1-a \
//!     --cpu 8 --ram-mb 16384 --workers 16
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use ember_core::{ClusterIdentity, ClusterSpec, EmberConfig, SpawnDefaults};
use ember_notify::{Notifier, NullNotifier, WebhookNotifier};
use ember_orchestrator::{OperationPoll, Orchestrator};
use ember_provider::{ComputeProvider, HttpCompute};
use ember_watchdog::{ActivitySource, HttpActivitySource, IdleWatchdog, WatchdogOutcome};

#[derive(Parser)]
#[command(name = "ember", about = "Ephemeral compute cluster lifecycle")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring a cluster up, or return the one already running.
    Spawn(SpawnArgs),

    /// Tear a cluster down and wait for the delete operation.
    Delete {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Run the on-node idle watchdog until it burns the cluster out.
    Watchdog(WatchdogArgs),
}

#[derive(Args)]
struct TargetArgs {
    /// Cluster name.
    #[arg(long)]
    name: String,

    /// Provider project that owns the cluster.
    #[arg(long)]
    project: String,

    /// Provider zone the cluster lives in.
    #[arg(long)]
    zone: String,

    /// Path to the ember.toml config file.
    #[arg(long, default_value = "ember.toml")]
    config: PathBuf,
}

impl TargetArgs {
    fn identity(&self) -> ClusterIdentity {
        ClusterIdentity::new(&self.name, &self.project, &self.zone)
    }
}

#[derive(Args)]
struct SpawnArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// CPU cores for the node's custom machine type.
    #[arg(long)]
    cpu: Option<u32>,

    /// RAM in MB, must be a multiple of 256.
    #[arg(long)]
    ram_mb: Option<u32>,

    /// Workers to launch on the node.
    #[arg(long)]
    workers: Option<u32>,

    /// Boot disk size in GB.
    #[arg(long)]
    disk_gb: Option<u32>,

    /// Launch on preemptible capacity.
    #[arg(long)]
    preemptible: bool,

    /// Seconds of all-idle workers before the node deletes itself.
    #[arg(long)]
    idle_grace: Option<u64>,

    /// Project owning the boot image.
    #[arg(long)]
    image_project: Option<String>,

    /// Family of the boot image.
    #[arg(long)]
    image_family: Option<String>,

    /// Always create, even when an instance with this name is listed.
    #[arg(long)]
    no_check_existing: bool,
}

#[derive(Args)]
struct WatchdogArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Seconds of all-idle workers before self-deletion.
    #[arg(long, default_value = "180")]
    idle_grace: u64,

    /// Seconds between activity snapshots.
    #[arg(long, default_value = "5")]
    poll_interval: u64,

    /// Workers endpoint to read activity from. Defaults to the
    /// scheduler dashboard on this node.
    #[arg(long)]
    activity_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,ember_orchestrator=debug,ember_watchdog=debug"
                    .parse()
                    .unwrap()
            }),
        )
        .init();

    let cli = Cli::parse();
    let shutdown = shutdown_signal();

    match cli.command {
        Command::Spawn(args) => run_spawn(args, shutdown).await,
        Command::Delete { target } => run_delete(target, shutdown).await,
        Command::Watchdog(args) => run_watchdog(args, shutdown).await,
    }
}

/// Flip the shared watch channel on Ctrl-C so every polling loop
/// unwinds. The sender lives as long as the process.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = tx.send(true);
            }
            Err(err) => warn!(error = %err, "cannot listen for shutdown signal"),
        }
        // keep the channel open either way; a closed channel reads as
        // cancellation to the loops
        std::future::pending::<()>().await;
    });
    rx
}

async fn run_spawn(args: SpawnArgs, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let config = EmberConfig::from_file(&args.target.config)?;
    let identity = args.target.identity();
    let spec = build_spec(&args, config.defaults.as_ref())?;

    let orchestrator = build_orchestrator(&config)?;
    let endpoint = orchestrator
        .spawn(&identity, &spec, !args.no_check_existing, shutdown)
        .await?;

    println!("external: {}", endpoint.external_address);
    println!("internal: {}", endpoint.internal_address);
    println!("dashboard: {}", endpoint.dashboard_url());
    Ok(())
}

async fn run_delete(target: TargetArgs, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let config = EmberConfig::from_file(&target.config)?;
    let identity = target.identity();

    let orchestrator = build_orchestrator(&config)?;
    orchestrator.delete(&identity, shutdown).await?;

    println!("deleted {}", identity);
    Ok(())
}

async fn run_watchdog(args: WatchdogArgs, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let config = EmberConfig::from_file(&args.target.config)?;
    let identity = args.target.identity();

    let source: Arc<dyn ActivitySource> = match &args.activity_url {
        Some(url) => Arc::new(HttpActivitySource::new(url)?),
        None => Arc::new(HttpActivitySource::local()?),
    };
    let watchdog = IdleWatchdog::new(
        source,
        build_provider(&config)?,
        build_notifier(&config)?,
        identity,
        Duration::from_secs(args.idle_grace),
    )
    .with_intervals(
        Duration::from_secs(args.poll_interval),
        Duration::from_secs(args.poll_interval),
    )
    .with_operation_poll(OperationPoll {
        interval: config.poll.operation_interval(),
        timeout: config.poll.operation_timeout(),
        ..OperationPoll::default()
    });

    match watchdog.run(shutdown).await? {
        WatchdogOutcome::Deleted => info!("cluster deleted after idle grace"),
        WatchdogOutcome::Cancelled => info!("watchdog stopped before the grace elapsed"),
    }
    Ok(())
}

fn build_orchestrator(config: &EmberConfig) -> anyhow::Result<Orchestrator> {
    Ok(
        Orchestrator::new(build_provider(config)?, build_notifier(config)?)
            .with_poll_config(&config.poll),
    )
}

fn build_provider(config: &EmberConfig) -> anyhow::Result<Arc<dyn ComputeProvider>> {
    let mut provider = HttpCompute::new(&config.provider.base_url)?;
    if let Some(token) = &config.provider.auth_token {
        provider = provider.with_token(token);
    }
    Ok(Arc::new(provider))
}

fn build_notifier(config: &EmberConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.notify {
        Some(notify) => Ok(Arc::new(WebhookNotifier::from_config(notify)?)),
        None => Ok(Arc::new(NullNotifier)),
    }
}

/// Merge CLI flags over config `[defaults]`. Shape values with no
/// sensible hard default must come from one of the two.
fn build_spec(args: &SpawnArgs, defaults: Option<&SpawnDefaults>) -> anyhow::Result<ClusterSpec> {
    let d = defaults.cloned().unwrap_or_default();
    Ok(ClusterSpec {
        image_project: require(args.image_project.clone(), d.image_project, "image-project")?,
        image_family: require(args.image_family.clone(), d.image_family, "image-family")?,
        cpu: require(args.cpu, d.cpu, "cpu")?,
        ram_mb: require(args.ram_mb, d.ram_mb, "ram-mb")?,
        worker_count: require(args.workers, d.worker_count, "workers")?,
        disk_size_gb: args.disk_gb.or(d.disk_size_gb).unwrap_or(10),
        preemptible: args.preemptible || d.preemptible.unwrap_or(false),
        idle_grace_secs: args.idle_grace.or(d.idle_grace_secs).unwrap_or(180),
    })
}

fn require<T>(flag: Option<T>, default: Option<T>, name: &str) -> anyhow::Result<T> {
    flag.or(default)
        .ok_or_else(|| anyhow::anyhow!("--{name} is required (config [defaults] has no value)"))
}
