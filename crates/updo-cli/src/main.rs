//! updo - declarative application updates

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use updo_cli::cmd;
use updo_cli::ui::Output;
use updo_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // --verbosity wins over RUST_LOG; quiet by default so progress lines stay readable.
    let filter = match cli.verbosity {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Upgrade => cmd::upgrade::upgrade(&cli).await,
        Commands::Purge => cmd::purge::purge(&cli).await,
        Commands::Version => {
            cmd::version::version();
            Ok(())
        }
        Commands::Completions { shell } => {
            cmd::completions::completions(*shell);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Output::new().error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
