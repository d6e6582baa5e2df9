#![warn(missing_docs)]

//! SIO trace replay: runs a recorded host workload through the scheduler

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sio_sched::replay::{load_trace, replay};
use sio_sched::{Scheduler, SchedulerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sio-replay")]
#[command(about = "Replay an I/O trace through the SIO scheduler", long_about = None)]
struct Cli {
    /// Trace file: JSON array of events or one JSON event per line
    trace: PathBuf,

    /// Scheduler config (.toml or .json)
    #[arg(short, long, env = "SIO_CONFIG")]
    config: Option<PathBuf>,

    /// Override a tunable, e.g. --set fifo_batch=16
    #[arg(short, long = "set", value_name = "NAME=VALUE")]
    sets: Vec<String>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::default(),
    };

    let mut sched = Scheduler::with_config(&config)?;
    for set in &cli.sets {
        let (name, value) = set
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got {:?}", set))?;
        sched.store_tunable(name, value)?;
    }

    let events = load_trace(&cli.trace)?;
    tracing::info!("Replaying {} event(s) from {}", events.len(), cli.trace.display());

    let report = replay(sched, &events)?;
    let out = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", out);
    Ok(())
}
