use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tessera_keeper::demo::Demo;
use tessera_keeper::{DistributionArtifact, Keeper, KeeperConfig};
use tessera_ledger::SubmissionClient;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tessera-keeper", version, about = "Epoch reward distribution keeper")]
struct Cli {
    /// Path to the keeper TOML config.
    #[arg(short, long, default_value = "keeper.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file to the given path.
    Init {
        #[arg(short, long, default_value = "keeper.toml")]
        output: PathBuf,
    },
    /// Stand up the local demo deployment and run a single epoch through
    /// the full pipeline.
    RunEpoch {
        #[arg(long, default_value_t = 1)]
        epoch: u64,
        #[arg(long, default_value_t = 4)]
        operators: usize,
        /// Directory for the distribution artifact (overrides the config).
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },
    /// Run the keeper control loop against the local demo deployment until
    /// interrupted.
    Start {
        #[arg(long, default_value_t = 4)]
        operators: usize,
        /// How many slots the demo clock advances per tick.
        #[arg(long, default_value_t = 10)]
        slots_per_tick: u64,
        #[arg(long, default_value_t = 250)]
        tick_ms: u64,
    },
    /// Summarize a previously written distribution artifact.
    Status { artifact: PathBuf },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Init { output } => {
            anyhow::ensure!(
                !output.exists(),
                "{} already exists, refusing to overwrite",
                output.display()
            );
            KeeperConfig::default().save(&output)?;
            info!(path = %output.display(), "default config written");
            Ok(())
        }
        Command::RunEpoch {
            epoch,
            operators,
            artifacts,
        } => run_epoch(epoch, operators, artifacts).await,
        Command::Start {
            operators,
            slots_per_tick,
            tick_ms,
        } => start(operators, slots_per_tick, tick_ms).await,
        Command::Status { artifact } => status(&artifact),
    }
}

async fn run_epoch(epoch: u64, operators: usize, artifacts: Option<PathBuf>) -> Result<()> {
    let mut demo = Demo::build(operators).await?;
    if artifacts.is_some() {
        demo.config.artifact_dir = artifacts;
    }

    // Move the demo clock past the requested boundary.
    let boundary = tessera_keeper::demo::demo_schedule()
        .start_slot(epoch)
        .context("epoch out of range for the demo schedule")?;
    demo.ledger.set_slot(boundary).await;

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = demo.runner(shutdown_rx);
    let report = runner.run_epoch(epoch).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    match report.failure {
        None => Ok(()),
        Some(reason) => anyhow::bail!("epoch {epoch} failed: {reason}"),
    }
}

async fn start(operators: usize, slots_per_tick: u64, tick_ms: u64) -> Result<()> {
    let demo = Demo::build(operators).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let clock_ledger = demo.ledger.clone();
    let mut clock_shutdown = shutdown_rx.clone();
    let clock = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(tick_ms)) => {
                    clock_ledger.advance_slot(slots_per_tick).await;
                }
                _ = clock_shutdown.changed() => break,
            }
        }
    });

    let mut keeper = Keeper::new(
        Arc::new(demo.ledger.clone()) as Arc<dyn SubmissionClient>,
        demo.snapshot_reader(),
        demo.oracle(),
        demo.config.clone(),
        demo.network,
        demo.authority,
        shutdown_rx,
    );

    info!("keeper running; press ctrl-c to stop");
    let outcome = tokio::select! {
        result = keeper.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            Ok(())
        }
    };
    let _ = shutdown_tx.send(true);
    clock.await.ok();
    outcome?;

    for report in keeper.reports() {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

fn status(path: &PathBuf) -> Result<()> {
    let artifact = DistributionArtifact::load(path)?;
    let total: u64 = artifact.leaves.iter().map(|leaf| leaf.amount).sum();
    println!("network:   {}", artifact.network);
    println!("epoch:     {}", artifact.epoch);
    println!("boundary:  slot {}", artifact.boundary_slot);
    println!("root:      {}", artifact.root);
    println!("generated: {}", artifact.generated_at);
    println!("leaves:    {} (total {total})", artifact.leaves.len());
    Ok(())
}
