//! Shared driver for `upgrade` and `purge`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use updo_core::{HttpRetriever, Mode, Orchestrator, ProcessRunner};
use updo_schema::Config;

use crate::Cli;
use crate::ui::Output;

/// Resolve the configuration path from `--config` or the XDG default.
pub fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => updo_core::paths::default_config_path(dirs::config_dir())
            .context("Could not determine the configuration directory; pass --config"),
    }
}

/// Load the configuration and apply command-line overrides.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let path = config_path(cli)?;
    let mut config = updo_core::config::load(&path)?;
    config.restrict(&cli.applications, &cli.disable)?;
    if let Some(token) = &cli.github_token {
        config.settings.github_token = Some(token.clone());
    }
    tracing::debug!(config = %path.display(), apps = config.apps.len(), "configuration loaded");
    Ok(config)
}

pub async fn execute(cli: &Cli, mode: Mode) -> Result<()> {
    let config = load_config(cli)?;
    let dry_run = !cli.commit;
    let output = Arc::new(Output::new());

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(HttpRetriever::new()?),
        Arc::new(ProcessRunner),
    )
    .with_reporter(output.clone());

    let report = orchestrator.run(mode, dry_run).await?;
    if dry_run && !report.is_empty() {
        output.hint("Dry run: re-run with --commit to apply these changes.");
    }
    Ok(())
}
