//! One pass over every configured application.
//!
//! Applications are grouped by priority and the groups run strictly one after
//! another, highest first. Inside a group up to `parallelization` workers run
//! at once (0 means no limit). Workers report back over a channel; a single
//! aggregator collects changes and failures once the group has drained, and
//! any failure stops the run before the next group starts.
//!
//! With indexing enabled, a dry run that sees changes leaves an index behind
//! and the next committing run only touches what that index names.

mod pipeline;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use updo_schema::{Application, Change, Config, IndexFile, IndexMode};

use crate::backend::{Retriever, StepRunner};
use crate::index::{IndexError, IndexStore};
use crate::lock::{LockError, PidLock};
use crate::purge::{self, PinnedNames, PurgeError};
use crate::reporter::{NullReporter, Reporter};

pub use pipeline::AppFailure;
use pipeline::Shared;

/// What a run does with each resolved application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Install new releases and re-run deploy steps where asked.
    Upgrade,
    /// Remove stale releases and orphaned directories.
    Purge,
}

impl Mode {
    pub fn index_mode(self) -> IndexMode {
        match self {
            Self::Upgrade => IndexMode::Update,
            Self::Purge => IndexMode::Purge,
        }
    }
}

/// A failure attributed to one application.
#[derive(Error, Debug)]
#[error("{name}: {source}")]
pub struct AppError {
    pub name: String,
    #[source]
    pub source: AppFailure,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Purge(#[from] PurgeError),

    #[error("{}", join_errors(.0))]
    Applications(Vec<AppError>),
}

fn join_errors(errors: &[AppError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One entry per application that changed (or would change).
    pub changes: Vec<Change>,
    /// Orphaned directories removed (or, in a dry run, found).
    pub orphans: Vec<PathBuf>,
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.orphans.is_empty()
    }
}

pub struct Orchestrator {
    config: Config,
    retriever: Arc<dyn Retriever>,
    runner: Arc<dyn StepRunner>,
    reporter: Arc<dyn Reporter>,
}

impl Orchestrator {
    pub fn new(config: Config, retriever: Arc<dyn Retriever>, runner: Arc<dyn StepRunner>) -> Self {
        Self {
            config,
            retriever,
            runner,
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, mode: Mode, dry_run: bool) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let settings = &self.config.settings;
        let pinned = PinnedNames::new(&settings.pinned)?;

        let _lock = if settings.lock {
            Some(PidLock::acquire(&settings.directory)?)
        } else {
            None
        };

        let store = settings
            .index
            .then(|| IndexStore::new(&settings.directory, mode.index_mode(), settings.strict_index));
        let prior = match &store {
            Some(store) => store.load()?,
            None => None,
        };

        let shared = Arc::new(Shared {
            settings: settings.clone(),
            retriever: self.retriever.clone(),
            runner: self.runner.clone(),
            reporter: self.reporter.clone(),
            pinned,
            mode,
            dry_run,
        });

        let mut changes = Vec::new();
        let mut seen = HashSet::new();
        for (priority, apps) in self.groups(mode, prior.as_ref()).into_iter().rev() {
            debug!(priority, size = apps.len(), "starting priority group");
            for change in self.run_group(apps, &shared).await? {
                if seen.insert(change.name.clone()) {
                    changes.push(change);
                }
            }
        }

        let orphans = if mode == Mode::Purge && settings.clean_dirs {
            self.clean_dirs(&shared, prior.as_ref())?
        } else {
            Vec::new()
        };

        let report = RunReport { changes, orphans };
        if let Some(store) = &store {
            if !dry_run {
                store.remove()?;
            } else if !report.is_empty() {
                store.write(&index_of(&report))?;
            }
        }

        self.reporter
            .summary(report.changes.len() + report.orphans.len(), dry_run, started.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Applications taking part in this run, keyed by priority.
    fn groups(&self, mode: Mode, prior: Option<&IndexFile>) -> BTreeMap<i64, Vec<Application>> {
        let mut groups: BTreeMap<i64, Vec<Application>> = BTreeMap::new();
        for app in self.config.enabled() {
            if let Some(index) = prior
                && !index.contains_name(&app.name)
            {
                self.reporter.skipped(&app.name, "not in index");
                continue;
            }
            if app.enablement.is_pinned() && !(mode == Mode::Upgrade && app.enablement.redeploys()) {
                self.reporter.skipped(&app.name, "pinned");
                continue;
            }
            groups.entry(app.priority).or_default().push(app.clone());
        }
        groups
    }

    async fn run_group(&self, apps: Vec<Application>, shared: &Arc<Shared>) -> Result<Vec<Change>, RunError> {
        let limit = shared.settings.parallelization;
        let semaphore = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending: BTreeSet<String> = BTreeSet::new();
        let mut join_set = JoinSet::new();

        for app in apps {
            pending.insert(app.name.clone());
            let tx = tx.clone();
            let shared = shared.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let outcome = pipeline::process(&app, &shared).await;
                let _ = tx.send((app.name, outcome));
            });
        }
        drop(tx);

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker panicked");
            }
        }

        let mut changes = Vec::new();
        let mut errors = Vec::new();
        while let Some((name, outcome)) = rx.recv().await {
            pending.remove(&name);
            match outcome {
                Ok(Some(change)) => {
                    self.reporter.change(&change, shared.dry_run);
                    changes.push(change);
                }
                Ok(None) => {}
                Err(source) => {
                    self.reporter.failed(&name, &source.to_string());
                    errors.push(AppError { name, source });
                }
            }
        }
        for name in pending {
            self.reporter.failed(&name, "worker terminated unexpectedly");
            errors.push(AppError {
                name,
                source: AppFailure::Aborted,
            });
        }

        if errors.is_empty() {
            Ok(changes)
        } else {
            errors.sort_by(|a, b| a.name.cmp(&b.name));
            Err(RunError::Applications(errors))
        }
    }

    /// Remove (or, in a dry run, report) managed-root directories nobody owns.
    fn clean_dirs(&self, shared: &Shared, prior: Option<&IndexFile>) -> Result<Vec<PathBuf>, RunError> {
        // Apps excluded from this run are still configured and own their dirs.
        let owners: BTreeSet<String> = self
            .config
            .apps
            .values()
            .filter(|a| !a.enablement.is_disabled())
            .map(|a| a.name.clone())
            .collect();
        let mut orphans = purge::orphan_dirs(&shared.settings.directory, &owners, &shared.pinned)?;
        if let Some(index) = prior {
            orphans.retain(|p| index.contains_dir(&dir_name(p)));
        }

        for path in &orphans {
            let change = Change::new(dir_name(path), "remove orphaned directory");
            if !shared.dry_run {
                info!(path = %path.display(), "removing orphaned directory");
                purge::remove_path(path)?;
            }
            self.reporter.change(&change, shared.dry_run);
        }
        Ok(orphans)
    }
}

fn dir_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn index_of(report: &RunReport) -> IndexFile {
    IndexFile {
        names: report.changes.iter().map(|c| c.name.clone()).collect(),
        dirs: report.orphans.iter().map(|p| dir_name(p)).collect(),
    }
}
