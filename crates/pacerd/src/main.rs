//! pacerd — runs a CPU-bound workload under adaptive load control.
//!
//! Assembles the pacer subsystems into one process:
//! - Configuration (pacer.toml + CLI overrides)
//! - Worker pool running the cube-sum search
//! - Supervisor driving the load controller
//!
//! # Usage
//!
//! ```text
//! pacerd run --config pacer.toml --workers 2 --duration 60
//! pacerd scaffold > pacer.toml
//! ```

mod workload;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, trace};

use pacer_control::{EventCallback, PacerEvent};
use pacer_core::PacerConfig;
use pacer_supervisor::Supervisor;

use crate::workload::{CubeSearch, DEFAULT_SEARCH_RANGE, DEFAULT_TARGET, MAX_SEARCH_RANGE};

#[derive(Parser)]
#[command(name = "pacerd", about = "Adaptive worker-pool load controller")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the synthetic workload until Ctrl-C or `--duration` elapses.
    Run {
        /// Path to pacer.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Initial pool size (overrides `pool.initial_workers`).
        #[arg(long)]
        workers: Option<usize>,

        /// Pool size ceiling (overrides `control.max_workers`).
        #[arg(long)]
        max_workers: Option<usize>,

        /// Stop after this many seconds.
        #[arg(long)]
        duration: Option<u64>,

        /// Half-width of the cube-sum search square; sets the cost of one unit.
        #[arg(
            long,
            default_value_t = DEFAULT_SEARCH_RANGE,
            value_parser = clap::value_parser!(i64).range(1..=MAX_SEARCH_RANGE)
        )]
        search_range: i64,

        /// Sum the cube search looks for.
        #[arg(long, default_value_t = DEFAULT_TARGET, allow_negative_numbers = true)]
        target: i64,
    },
    /// Print the default pacer.toml for this machine.
    Scaffold,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Run {
            config,
            workers,
            max_workers,
            duration,
            search_range,
            target,
        } => run(config, workers, max_workers, duration, search_range, target).await,
        Command::Scaffold => {
            print!("{}", PacerConfig::scaffold().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,pacer=debug"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(
    path: Option<PathBuf>,
    workers: Option<usize>,
    max_workers: Option<usize>,
) -> anyhow::Result<PacerConfig> {
    let mut config = match path {
        Some(path) => PacerConfig::from_file(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => PacerConfig::default(),
    };
    if let Some(max) = max_workers {
        config.control.max_workers = max;
    }
    if let Some(workers) = workers {
        config.pool.initial_workers = workers;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run(
    config: Option<PathBuf>,
    workers: Option<usize>,
    max_workers: Option<usize>,
    duration: Option<u64>,
    search_range: i64,
    target: i64,
) -> anyhow::Result<()> {
    let config = load_config(config, workers, max_workers)?;
    info!(
        initial_workers = config.pool.initial_workers,
        max_workers = config.control.max_workers,
        search_range,
        cube_sum = target,
        "pacerd starting"
    );

    let search = Arc::new(CubeSearch::new(search_range).with_target(target));
    let callback: EventCallback = Arc::new(|event: PacerEvent| log_event(&event));
    let mut supervisor = Supervisor::new(config, search.clone())?.with_callback(callback);
    supervisor.start()?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor_handle = tokio::spawn(async move {
        supervisor.run(shutdown_rx).await;
        supervisor
    });

    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "run duration elapsed");
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to install Ctrl-C handler")?;
                    info!("shutdown signal received");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("failed to install Ctrl-C handler")?;
            info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let supervisor = supervisor_handle.await?;

    println!("{}", serde_json::to_string_pretty(&supervisor.summary())?);
    info!(solutions = search.solutions(), "pacerd stopped");
    Ok(())
}

fn log_event(event: &PacerEvent) {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => format!("{event:?} ({e})"),
    };
    match event {
        // One per completed unit.
        PacerEvent::WorkerPerformanceUpdated { .. } => {
            trace!(target: "pacerd::events", %payload, "worker performance")
        }
        _ => info!(target: "pacerd::events", %payload, "pacer event"),
    }
}
