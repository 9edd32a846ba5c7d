mod config;
mod engine;
mod manager;
mod model;
mod population;
mod predictor;
mod stats;

use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Run {
        #[arg(long)]
        seed: Option<u64>,
    },

    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    match args.command {
        Command::Run { seed } => {
            let mut mgr = Manager::new(&args.sim_dir, seed).context("failed to construct mgr")?;
            let reports = mgr.run_session().context("failed to run session")?;
            mgr.save_reports(&reports).context("failed to save reports")?;
        }
        Command::Clean => {
            let mgr = Manager::new(&args.sim_dir, None).context("failed to construct mgr")?;
            mgr.clean_results()?;
        }
    }

    Ok(())
}
