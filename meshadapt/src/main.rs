//! Command-line driver for the mesh-adaptation loop.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use meshadapt::bootstrap::preflight;
use meshadapt::core::schedule::{Schedule, plan_schedule};
use meshadapt::error::exit_code_for;
use meshadapt::exit_codes;
use meshadapt::io::config::load_config;
use meshadapt::io::remesher::AmgRemesher;
use meshadapt::io::solver::Su2Solver;
use meshadapt::logging;
use meshadapt::looping::run_adaptation;

#[derive(Parser)]
#[command(
    name = "meshadapt",
    version,
    about = "Anisotropic mesh-adaptation loop around an external CFD solver and remesher"
)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full adaptive loop described by a config file.
    Run {
        /// Adaptation config (TOML); relative paths resolve against its directory.
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a config file and print the size-level schedule.
    Plan {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli.command) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Run { config } => cmd_run(&config),
        Command::Plan { config } => cmd_plan(&config),
    }
}

fn cmd_run(config_path: &Path) -> Result<()> {
    let loaded = load_config(config_path)?;
    let solver = Su2Solver::from_config(&loaded.config)?;
    let remesher = AmgRemesher::from_config(&loaded.config)?;
    let outcome = run_adaptation(&loaded, &solver, &remesher)?;
    println!("stages: {}", outcome.stages);
    println!("mesh: {}", outcome.mesh_out.display());
    println!("solution: {}", outcome.restart_out.display());
    println!("history: {}", outcome.history.display());
    Ok(())
}

fn cmd_plan(config_path: &Path) -> Result<()> {
    let loaded = load_config(config_path)?;
    let schedule = plan_schedule(&loaded.config)?;
    preflight(&loaded.config, schedule.sensor)?;
    print!("{}", render_schedule(&schedule));
    Ok(())
}

fn render_schedule(schedule: &Schedule) -> String {
    let mut out = format!("sensor: {}\n", schedule.sensor);
    out.push_str("level  complexity  sub_iterations  flow_iter  adj_iter  cfl\n");
    for level in &schedule.levels {
        out.push_str(&format!(
            "{:<5}  {:<10}  {:<14}  {:<9}  {:<8}  {}\n",
            level.index + 1,
            level.complexity,
            level.sub_iterations,
            level.flow_iter,
            level.adj_iter,
            level.cfl
        ));
    }
    out.push_str(&format!(
        "total sub-iterations: {}\n",
        schedule.total_sub_iterations()
    ));
    out
}
