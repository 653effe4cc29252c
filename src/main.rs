mod cli;
mod commands;
mod config;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Command::Generate(args) => commands::generate::run(&ctx, args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "kubegen", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(err) = &result
        && let Some(cause) = err
            .chain()
            .find_map(|e| e.downcast_ref::<fixturekit::Error>())
    {
        let category = cause.category();
        ui::error(category.description());
        ui::dim(category.advice());
    }
    result
}
