//! Stackform CLI - template rendering, normalization, validation, and
//! simulated-backend testing.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use stackform::normalize::ParseError;

/// Exit code when validation produced error-severity findings (distinct
/// from an operational crash, which is 1).
pub const EXIT_FINDINGS: i32 = 2;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Parse errors carry source spans; render them with miette.
            match e.downcast::<ParseError>() {
                Ok(parse_err) => eprintln!("{:?}", miette::Report::new(parse_err)),
                Err(e) => eprintln!("error: {:#}", e),
            }
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("stackform=debug")
    } else {
        EnvFilter::new("stackform=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    match cli.command {
        Commands::Render(args) => commands::render::execute(args),
        Commands::Convert(args) => commands::convert::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Test(args) => commands::test::execute(args),
    }
}
