//! Purge command - remove stale releases and orphaned directories

use anyhow::Result;
use updo_core::Mode;

use crate::Cli;

pub async fn purge(cli: &Cli) -> Result<()> {
    super::run::execute(cli, Mode::Purge).await
}
