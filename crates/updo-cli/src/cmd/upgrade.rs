//! Upgrade command - bring applications up to their latest upstream release

use anyhow::Result;
use updo_core::Mode;

use crate::Cli;

pub async fn upgrade(cli: &Cli) -> Result<()> {
    super::run::execute(cli, Mode::Upgrade).await
}
