mod commands;

use crate::commands::run::{handle_run, RunArgs};
use crate::commands::validate::handle_validate;
use clap::{Parser, Subcommand};
use common::error::AppError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stager")]
pub struct Cli {
    #[arg(
        long = "config-path",
        short = 'c',
        help = "path to stager.yml or the directory holding it",
        global = true
    )]
    pub config_path: Option<PathBuf>,
    #[arg(long, short = 'v', help = "log debug output", global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Resolve the input mapping and stage it into the configured target
    Run(RunArgs),
    /// Check the project file and input mapping without contacting storage
    Validate,
}

fn run_cmd(func: Result<(), AppError>) {
    if let Err(e) = func {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    match cli.command {
        Cmd::Run(args) => run_cmd(handle_run(&args, cli.config_path)),
        Cmd::Validate => run_cmd(handle_validate(cli.config_path)),
    }
}
