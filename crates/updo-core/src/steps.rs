//! Build and deploy step execution.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use updo_schema::Step;

use crate::backend::{BackendError, Invocation, StepRunner};
use crate::template::{self, TemplateContext, TemplateError};

#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("step '{step}' failed: {source}")]
    Failed {
        step: String,
        #[source]
        source: BackendError,
    },
}

/// Render the per-application environment map.
pub fn render_env(
    env: &BTreeMap<String, String>,
    ctx: &TemplateContext,
) -> Result<BTreeMap<String, String>, TemplateError> {
    env.iter()
        .map(|(k, v)| Ok((k.clone(), template::render(v, ctx)?)))
        .collect()
}

/// Run `steps` in order inside `cwd`, stopping at the first failure.
pub async fn run_steps(
    phase: &str,
    steps: &[Step],
    cwd: &Path,
    env: &BTreeMap<String, String>,
    ctx: &TemplateContext,
    runner: &dyn StepRunner,
) -> Result<(), StepError> {
    for step in steps {
        let argv = template::render_all(&step.argv(), ctx)?;
        let label = argv.join(" ");
        info!(app = ctx.name(), phase, step = %label, "running step");
        let invocation = Invocation::new(argv).cwd(cwd).env(env.clone());
        runner
            .run(&invocation)
            .await
            .map_err(|source| StepError::Failed { step: label, source })?;
    }
    Ok(())
}
