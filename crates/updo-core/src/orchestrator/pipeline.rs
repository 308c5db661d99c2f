//! Work done for a single application inside a priority group.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use updo_schema::{Application, Change, Settings};

use super::Mode;
use crate::backend::{BackendError, HttpRequest, Retriever, StepRunner};
use crate::fetch::{self, FetchContext, FetchError};
use crate::paths::app_dir;
use crate::purge::{self, PinnedNames, PurgeError};
use crate::reporter::Reporter;
use crate::resource::{ExtractCommand, PlacedResource, ResourceError};
use crate::steps::{self, StepError};
use crate::template::{TemplateContext, TemplateError};

/// Why one application failed.
#[derive(Error, Debug)]
pub enum AppFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Purge(#[from] PurgeError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker terminated unexpectedly")]
    Aborted,
}

/// Read-only state shared by every worker of a run.
pub(crate) struct Shared {
    pub settings: Settings,
    pub retriever: Arc<dyn Retriever>,
    pub runner: Arc<dyn StepRunner>,
    pub reporter: Arc<dyn Reporter>,
    pub pinned: PinnedNames,
    pub mode: Mode,
    pub dry_run: bool,
}

pub(crate) async fn process(app: &Application, shared: &Shared) -> Result<Option<Change>, AppFailure> {
    let work_dir = app_dir(&shared.settings.directory, &app.name);
    let mut ctx = TemplateContext::new(&app.name)
        .with("dir", work_dir.to_string_lossy())
        .with("root", shared.settings.directory.to_string_lossy());

    if app.enablement.is_pinned() {
        return redeploy_pinned(app, &work_dir, ctx, shared).await;
    }

    let fctx = FetchContext {
        template: ctx.clone(),
        github_api: shared.settings.github_api.clone(),
        github_token: shared.settings.github_token.clone(),
        timeout: timeout(app),
    };
    let resource = fetch::resolve(&app.source, shared.retriever.as_ref(), &fctx).await?;
    shared.reporter.resolved(&app.name, &resource.tag);

    let placed = resource.set_app_data(&app.name, &work_dir, &app.extract);
    placed.bind(&mut ctx);

    match shared.mode {
        Mode::Upgrade => upgrade(app, &work_dir, &placed, &ctx, shared).await,
        Mode::Purge => purge_stale(app, &work_dir, &placed, shared),
    }
}

fn timeout(app: &Application) -> Option<Duration> {
    app.timeout.map(Duration::from_secs)
}

async fn upgrade(
    app: &Application,
    work_dir: &Path,
    placed: &PlacedResource,
    ctx: &TemplateContext,
    shared: &Shared,
) -> Result<Option<Change>, AppFailure> {
    let tag = placed.tag();

    if placed.is_unpacked() {
        if !app.enablement.redeploys() {
            debug!(app = %app.name, %tag, "up to date");
            return Ok(None);
        }
        let change = Change::new(&app.name, format!("redeploy {tag}"));
        if !shared.dry_run {
            deploy(app, &placed.unpack, ctx, shared).await?;
        }
        return Ok(Some(change));
    }

    let detail = if deployed_releases(work_dir, &app.name).is_empty() {
        format!("install {tag}")
    } else {
        format!("update to {tag}")
    };
    let change = Change::new(&app.name, detail);
    if shared.dry_run {
        return Ok(Some(change));
    }

    tokio::fs::create_dir_all(work_dir).await?;
    if placed.archive.exists() {
        debug!(archive = %placed.archive.display(), "reusing downloaded archive");
    } else {
        let bytes = shared
            .retriever
            .download(download_request(app, placed, shared), &placed.archive)
            .await?;
        info!(app = %app.name, %tag, bytes, "downloaded");
    }

    let installed = async {
        match placed.extract {
            ExtractCommand::Command(_) => {
                placed
                    .extract(shared.retriever.as_ref(), shared.runner.as_ref(), ctx)
                    .await?;
            }
            ExtractCommand::Skip => placed.install_plain().await?,
        }
        let env = steps::render_env(&app.env, ctx)?;
        steps::run_steps("build", &app.build, &placed.unpack, &env, ctx, shared.runner.as_ref()).await?;
        steps::run_steps("deploy", &app.deploy, &placed.unpack, &env, ctx, shared.runner.as_ref()).await?;
        Ok::<(), AppFailure>(())
    }
    .await;
    if let Err(e) = installed {
        // An existing unpack dir marks the release as installed; remove it so the next run retries.
        if let Err(cleanup) = tokio::fs::remove_dir_all(&placed.unpack).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(unpack = %placed.unpack.display(), "failed to remove partial release: {cleanup}");
        }
        return Err(e);
    }
    Ok(Some(change))
}

fn download_request(app: &Application, placed: &PlacedResource, shared: &Shared) -> HttpRequest {
    let url = &placed.resource.url;
    let req = HttpRequest::get(url.clone()).timeout(timeout(app));
    match &shared.settings.github_token {
        Some(token) if url.starts_with(&shared.settings.github_api) => {
            req.header("Authorization", format!("Bearer {token}"))
        }
        _ => req,
    }
}

async fn deploy(app: &Application, unpack: &Path, ctx: &TemplateContext, shared: &Shared) -> Result<(), AppFailure> {
    let env = steps::render_env(&app.env, ctx)?;
    steps::run_steps("deploy", &app.deploy, unpack, &env, ctx, shared.runner.as_ref()).await?;
    Ok(())
}

/// Pinned applications are never resolved; with `redeploy` the newest
/// release already on disk has its deploy steps re-run.
async fn redeploy_pinned(
    app: &Application,
    work_dir: &Path,
    mut ctx: TemplateContext,
    shared: &Shared,
) -> Result<Option<Change>, AppFailure> {
    if shared.mode != Mode::Upgrade || !app.enablement.redeploys() {
        return Ok(None);
    }
    let Some((unpack, tag)) = newest_release(work_dir, &app.name) else {
        debug!(app = %app.name, "pinned with nothing deployed");
        return Ok(None);
    };
    ctx.set_tag(&tag);
    ctx.set("unpack", unpack.to_string_lossy());

    let change = Change::new(&app.name, format!("redeploy {tag}"));
    if !shared.dry_run {
        deploy(app, &unpack, &ctx, shared).await?;
    }
    Ok(Some(change))
}

fn purge_stale(
    app: &Application,
    work_dir: &Path,
    placed: &PlacedResource,
    shared: &Shared,
) -> Result<Option<Change>, AppFailure> {
    let removed = purge::purge_with(work_dir, placed, &shared.pinned, |path| {
        if shared.dry_run {
            info!(app = %app.name, path = %path.display(), "would remove");
            Ok(())
        } else {
            info!(app = %app.name, path = %path.display(), "removing");
            purge::remove_path(path)
        }
    })?;
    if removed.is_empty() {
        return Ok(None);
    }
    let names: Vec<String> = removed
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .collect();
    Ok(Some(Change::new(&app.name, format!("purge {}", names.join(", ")))))
}

/// Unpack directories (`{hash}.{name}.{tag}`) in `work_dir`, with their tags.
fn deployed_releases(work_dir: &Path, name: &str) -> Vec<(PathBuf, String, std::time::SystemTime)> {
    let Ok(entries) = std::fs::read_dir(work_dir) else {
        return Vec::new();
    };
    let infix = format!("{name}.");
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_dir() {
                return None;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            let (_hash, rest) = file_name.split_once('.')?;
            let tag = rest.strip_prefix(&infix)?.to_string();
            let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
            Some((entry.path(), tag, modified))
        })
        .collect()
}

fn newest_release(work_dir: &Path, name: &str) -> Option<(PathBuf, String)> {
    deployed_releases(work_dir, name)
        .into_iter()
        .max_by_key(|(_, _, modified)| *modified)
        .map(|(path, tag, _)| (path, tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_deployed_releases() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("0a1b2c3d.tool.v1.0")).unwrap();
        fs::create_dir(tmp.path().join("0a1b2c3d.other.v1.0")).unwrap();
        fs::write(tmp.path().join("0a1b2c3d.tool-1.0.tar.gz"), b"x").unwrap();

        let found = deployed_releases(tmp.path(), "tool");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, "v1.0");

        let (path, tag) = newest_release(tmp.path(), "tool").unwrap();
        assert_eq!(path, tmp.path().join("0a1b2c3d.tool.v1.0"));
        assert_eq!(tag, "v1.0");
        assert!(newest_release(tmp.path(), "missing").is_none());
    }
}
