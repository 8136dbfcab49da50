//! Rasterhub CLI - job-spec batch and stream modes plus engine tooling

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();

    let result = match cli.command {
        Commands::Batch(args) => commands::batch::run(&args),
        Commands::Stream(args) => commands::stream::run(&args),
        Commands::Validate(args) => commands::validate::run(&args),
        Commands::Engines(args) => commands::engines::run(&args),
        Commands::Render(args) => commands::render::run(&args),
        Commands::RenderBatch(args) => commands::render_batch::run(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
