//! Configuration data model.
//!
//! `*Def` types mirror the TOML layout one to one; `TryFrom` turns them into
//! the validated [`Config`] the engine runs on.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Default GitHub REST endpoint.
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Default ceiling for per-application request timeouts, in seconds.
pub const DEFAULT_MAX_TIMEOUT: u64 = 300;

/// Errors raised while turning configuration into the validated data model.
///
/// These are always fatal and are reported before any network or filesystem
/// activity takes place.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No fetch source was configured for an application.
    #[error("{0}: no upstream configured")]
    NoSource(String),

    /// More than one fetch source was configured for an application.
    #[error("{name}: multiple upstreams configured ({})", .sources.join(", "))]
    MultipleSources {
        /// Application name.
        name: String,
        /// The configured source keys.
        sources: Vec<&'static str>,
    },

    /// The `disabled`/`pinned`/`redeploy` flags form an unsupported combination.
    #[error("{0}: disabled cannot be combined with pinned or redeploy")]
    InvalidFlags(String),

    /// An application's timeout exceeds the global ceiling.
    #[error("{name}: timeout {timeout}s exceeds maximum of {max}s")]
    TimeoutTooLarge {
        /// Application name.
        name: String,
        /// Requested timeout in seconds.
        timeout: u64,
        /// Configured ceiling in seconds.
        max: u64,
    },

    /// The same application was declared twice (e.g. in two included files).
    #[error("{0}: declared more than once")]
    Duplicate(String),

    /// An application name referenced on the command line does not exist.
    #[error("{0}: no such application")]
    UnknownApplication(String),
}

/// Sort mode applied to filter candidates before the winner is picked.
///
/// `Sort` and `Semver` put the greatest candidate first. The `r` variants do
/// *not* reverse the ascending order, so they select the smallest candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Keep discovery order.
    #[default]
    #[serde(rename = "", alias = "none")]
    None,
    /// Lexicographic, greatest first.
    Sort,
    /// Lexicographic, smallest first.
    Rsort,
    /// Semantic version, highest first.
    Semver,
    /// Semantic version, lowest first.
    Rsemver,
}

/// Declarative rule for turning line-oriented text into a version tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Regular expressions applied, in order, to every non-blank line.
    #[serde(default)]
    pub filters: Vec<String>,
    /// How candidates are ordered before the first one is chosen.
    #[serde(default)]
    pub sort: SortMode,
    /// Download URL template, rendered with the winning tag.
    #[serde(default)]
    pub download_url: String,
}

/// GitHub-hosted upstream: either the latest release or the head of a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubSource {
    /// `owner/repo`.
    #[serde(default)]
    pub project: String,
    /// Regex matched against release asset names, or `source` for the tarball.
    #[serde(default)]
    pub asset: Option<String>,
    /// Branch to track instead of releases.
    #[serde(default)]
    pub branch: Option<String>,
}

/// Tags listed from a git remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    /// Remote URL passed to `git ls-remote`.
    #[serde(default)]
    pub url: String,
    /// Tag selection rules.
    #[serde(flatten)]
    pub filter: FilterSpec,
}

/// A web page scraped line by line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSource {
    /// Page to fetch.
    #[serde(default)]
    pub url: String,
    /// Tag selection rules.
    #[serde(flatten)]
    pub filter: FilterSpec,
}

/// Output of an arbitrary command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSource {
    /// Executable to run.
    #[serde(default)]
    pub program: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Tag selection rules.
    #[serde(flatten)]
    pub filter: FilterSpec,
}

/// A fixed tag and URL, both optionally templated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticSource {
    /// Version tag.
    #[serde(default)]
    pub tag: String,
    /// Download URL.
    #[serde(default)]
    pub url: String,
}

/// The single upstream an application is resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// GitHub release or branch.
    GitHub(GitHubSource),
    /// Git remote tags.
    Git(GitSource),
    /// Scraped web page.
    Web(WebSource),
    /// Command output.
    Command(CommandSource),
    /// Fixed tag and URL.
    Static(StaticSource),
}

impl Source {
    /// Configuration key of this source variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GitHub(_) => "github",
            Self::Git(_) => "git",
            Self::Web(_) => "web",
            Self::Command(_) => "command",
            Self::Static(_) => "static",
        }
    }
}

/// Valid combinations of the `disabled`, `pinned` and `redeploy` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Enablement {
    /// Updated normally.
    #[default]
    Enabled,
    /// Kept on disk, never updated.
    Pinned,
    /// Deploy steps re-run even when the release is already unpacked.
    Redeploy,
    /// Pinned, with deploy steps re-run.
    PinnedRedeploy,
    /// Ignored entirely.
    Disabled,
}

impl Enablement {
    /// Build from the three configuration booleans.
    ///
    /// Returns `None` for combinations that make no sense (disabled together
    /// with anything else).
    pub fn from_flags(disabled: bool, pinned: bool, redeploy: bool) -> Option<Self> {
        match (disabled, pinned, redeploy) {
            (false, false, false) => Some(Self::Enabled),
            (false, true, false) => Some(Self::Pinned),
            (false, false, true) => Some(Self::Redeploy),
            (false, true, true) => Some(Self::PinnedRedeploy),
            (true, false, false) => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Whether the application is disabled in the configuration.
    pub fn is_disabled(self) -> bool {
        self == Self::Disabled
    }

    /// Whether updates are suppressed.
    pub fn is_pinned(self) -> bool {
        matches!(self, Self::Pinned | Self::PinnedRedeploy)
    }

    /// Whether deploy steps re-run for an already unpacked release.
    pub fn redeploys(self) -> bool {
        matches!(self, Self::Redeploy | Self::PinnedRedeploy)
    }
}

/// Archive extraction overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Explicit extraction command; must contain `{{ input }}` and `{{ output }}`.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Never strip a single top-level directory from the archive.
    #[serde(default)]
    pub disable_strip: bool,
}

/// A build or deploy step: either a shell snippet or an argv list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    /// Run through `sh -c`.
    Shell(String),
    /// Run directly.
    Argv(Vec<String>),
}

impl Step {
    /// The argv this step executes, before templating.
    pub fn argv(&self) -> Vec<String> {
        match self {
            Self::Shell(script) => vec!["sh".to_string(), "-c".to_string(), script.clone()],
            Self::Argv(argv) => argv.clone(),
        }
    }
}

/// One managed unit of software, validated and immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    /// Name, taken from the configuration key.
    pub name: String,
    /// Higher priorities are processed first.
    pub priority: i64,
    /// Enablement flags.
    pub enablement: Enablement,
    /// Per-request timeout in seconds.
    pub timeout: Option<u64>,
    /// The upstream this application resolves from.
    pub source: Source,
    /// Extraction overrides.
    pub extract: Extraction,
    /// Steps run inside the unpack directory after extraction.
    pub build: Vec<Step>,
    /// Steps run after the build steps, and again on redeploy.
    pub deploy: Vec<Step>,
    /// Extra environment for build and deploy steps (templated).
    pub env: BTreeMap<String, String>,
}

/// Raw, unvalidated application table as written in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationDef {
    /// See [`Application::priority`].
    #[serde(default)]
    pub priority: i64,
    /// Skip this application.
    #[serde(default)]
    pub disabled: bool,
    /// Keep, but never update.
    #[serde(default)]
    pub pinned: bool,
    /// Re-run deploy steps every run.
    #[serde(default)]
    pub redeploy: bool,
    /// See [`Application::timeout`].
    #[serde(default)]
    pub timeout: Option<u64>,
    /// GitHub upstream.
    #[serde(default)]
    pub github: Option<GitHubSource>,
    /// Git remote upstream.
    #[serde(default)]
    pub git: Option<GitSource>,
    /// Web page upstream.
    #[serde(default)]
    pub web: Option<WebSource>,
    /// Command upstream.
    #[serde(default)]
    pub command: Option<CommandSource>,
    /// Static upstream.
    #[serde(default, rename = "static")]
    pub static_: Option<StaticSource>,
    /// See [`Application::extract`].
    #[serde(default)]
    pub extract: Extraction,
    /// See [`Application::build`].
    #[serde(default)]
    pub build: Vec<Step>,
    /// See [`Application::deploy`].
    #[serde(default)]
    pub deploy: Vec<Step>,
    /// See [`Application::env`].
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ApplicationDef {
    /// Validate and convert into an [`Application`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoSource`] or [`ConfigError::MultipleSources`]
    /// unless exactly one upstream is set, and [`ConfigError::InvalidFlags`]
    /// for an unsupported flag combination.
    pub fn into_application(self, name: &str) -> Result<Application, ConfigError> {
        let enablement = Enablement::from_flags(self.disabled, self.pinned, self.redeploy)
            .ok_or_else(|| ConfigError::InvalidFlags(name.to_string()))?;

        let mut sources: Vec<Source> = Vec::new();
        sources.extend(self.github.map(Source::GitHub));
        sources.extend(self.git.map(Source::Git));
        sources.extend(self.web.map(Source::Web));
        sources.extend(self.command.map(Source::Command));
        sources.extend(self.static_.map(Source::Static));

        let source = match sources.len() {
            0 => return Err(ConfigError::NoSource(name.to_string())),
            1 => sources.remove(0),
            _ => {
                return Err(ConfigError::MultipleSources {
                    name: name.to_string(),
                    sources: sources.iter().map(Source::kind).collect(),
                });
            }
        };

        Ok(Application {
            name: name.to_string(),
            priority: self.priority,
            enablement,
            timeout: self.timeout,
            source,
            extract: self.extract,
            build: self.build,
            deploy: self.deploy,
            env: self.env,
        })
    }
}

fn default_github_api() -> String {
    DEFAULT_GITHUB_API.to_string()
}

fn default_max_timeout() -> u64 {
    DEFAULT_MAX_TIMEOUT
}

fn default_true() -> bool {
    true
}

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Managed root; each application owns `directory/<name>`.
    pub directory: PathBuf,
    /// Maximum concurrent applications within one priority group (0 = unbounded).
    #[serde(default)]
    pub parallelization: usize,
    /// Persist and honour incremental run indices.
    #[serde(default)]
    pub index: bool,
    /// Fail when indexing is enabled and no index file exists.
    #[serde(default)]
    pub strict_index: bool,
    /// Ceiling for per-application timeouts, in seconds.
    #[serde(default = "default_max_timeout")]
    pub max_timeout: u64,
    /// Regexes naming directory entries purge must never remove.
    #[serde(default)]
    pub pinned: Vec<String>,
    /// Remove managed-root subdirectories no application owns.
    #[serde(default)]
    pub clean_dirs: bool,
    /// Hold a PID lock for the duration of the run.
    #[serde(default = "default_true")]
    pub lock: bool,
    /// GitHub REST endpoint.
    #[serde(default = "default_github_api")]
    pub github_api: String,
    /// Token sent to the GitHub API.
    #[serde(default, skip_serializing)]
    pub github_token: Option<String>,
}

impl Settings {
    /// Settings with defaults for everything but the managed root.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            parallelization: 0,
            index: false,
            strict_index: false,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            pinned: Vec::new(),
            clean_dirs: false,
            lock: true,
            github_api: DEFAULT_GITHUB_API.to_string(),
            github_token: None,
        }
    }
}

/// Raw configuration document, before includes are merged and applications validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDef {
    /// Glob patterns of additional files contributing `[apps.*]` tables.
    #[serde(default)]
    pub include: Vec<String>,
    /// Run-wide settings.
    pub settings: Settings,
    /// Application tables keyed by name.
    #[serde(default)]
    pub apps: BTreeMap<String, ApplicationDef>,
}

/// A file that only contributes applications (the target of `include`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppsDef {
    /// Application tables keyed by name.
    #[serde(default)]
    pub apps: BTreeMap<String, ApplicationDef>,
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ConfigDef")]
pub struct Config {
    /// Run-wide settings.
    pub settings: Settings,
    /// Applications keyed by name.
    pub apps: BTreeMap<String, Application>,
    /// Applications left out of this run by `--applications`/`--disable`.
    ///
    /// They are still configured, so their directories are never orphans.
    pub excluded: BTreeSet<String>,
}

impl TryFrom<ConfigDef> for Config {
    type Error = ConfigError;

    fn try_from(def: ConfigDef) -> Result<Self, Self::Error> {
        let mut apps = BTreeMap::new();
        for (name, app) in def.apps {
            let app = app.into_application(&name)?;
            if let Some(timeout) = app.timeout
                && timeout > def.settings.max_timeout
            {
                return Err(ConfigError::TimeoutTooLarge {
                    name,
                    timeout,
                    max: def.settings.max_timeout,
                });
            }
            apps.insert(name, app);
        }
        Ok(Self {
            settings: def.settings,
            apps,
            excluded: BTreeSet::new(),
        })
    }
}

impl Config {
    /// Apply `--applications` and `--disable` style overrides.
    ///
    /// A non-empty `only` list excludes every application not named in it.
    /// Exclusion only affects [`Config::enabled`]; each application keeps its
    /// configured [`Enablement`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownApplication`] for names that are not configured.
    pub fn restrict(&mut self, only: &[String], disable: &[String]) -> Result<(), ConfigError> {
        for name in only.iter().chain(disable) {
            if !self.apps.contains_key(name) {
                return Err(ConfigError::UnknownApplication(name.clone()));
            }
        }
        self.excluded = self
            .apps
            .keys()
            .filter(|name| (!only.is_empty() && !only.contains(*name)) || disable.contains(*name))
            .cloned()
            .collect();
        Ok(())
    }

    /// Applications that take part in this run.
    pub fn enabled(&self) -> impl Iterator<Item = &Application> {
        self.apps
            .values()
            .filter(|a| !a.enablement.is_disabled() && !self.excluded.contains(&a.name))
    }
}

/// One observed create, update or purge event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Application the change belongs to.
    pub name: String,
    /// Human-readable description.
    pub detail: String,
}

impl Change {
    /// Create a change record.
    pub fn new(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(doc: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(doc)
    }

    #[test]
    fn test_single_source_accepted() {
        let cfg = parse(
            r#"
            [settings]
            directory = "/opt/apps"

            [apps.rg]
            priority = 10
            [apps.rg.github]
            project = "BurntSushi/ripgrep"
            asset = "ripgrep-.*-x86_64-unknown-linux-musl.tar.gz"
            "#,
        )
        .unwrap();

        let app = &cfg.apps["rg"];
        assert_eq!(app.name, "rg");
        assert_eq!(app.priority, 10);
        assert_eq!(app.source.kind(), "github");
        assert_eq!(cfg.settings.max_timeout, DEFAULT_MAX_TIMEOUT);
        assert!(cfg.settings.lock);
    }

    #[test]
    fn test_zero_sources_rejected() {
        let err = ApplicationDef::default().into_application("x").unwrap_err();
        assert_eq!(err, ConfigError::NoSource("x".to_string()));
    }

    #[test]
    fn test_multiple_sources_rejected() {
        let def = ApplicationDef {
            web: Some(WebSource::default()),
            static_: Some(StaticSource::default()),
            ..Default::default()
        };
        let err = def.into_application("x").unwrap_err();
        assert!(matches!(err, ConfigError::MultipleSources { ref sources, .. } if sources == &["web", "static"]));
        assert!(err.to_string().contains("multiple upstreams"));
    }

    #[test]
    fn test_flag_combinations() {
        assert_eq!(Enablement::from_flags(false, true, true), Some(Enablement::PinnedRedeploy));
        assert_eq!(Enablement::from_flags(true, false, false), Some(Enablement::Disabled));
        assert_eq!(Enablement::from_flags(true, true, false), None);
        assert_eq!(Enablement::from_flags(true, false, true), None);

        let def = ApplicationDef {
            disabled: true,
            pinned: true,
            static_: Some(StaticSource::default()),
            ..Default::default()
        };
        assert_eq!(
            def.into_application("x").unwrap_err(),
            ConfigError::InvalidFlags("x".to_string())
        );
    }

    #[test]
    fn test_timeout_ceiling() {
        let err = parse(
            r#"
            [settings]
            directory = "/opt/apps"
            max_timeout = 30

            [apps.slow]
            timeout = 60
            [apps.slow.static]
            tag = "1"
            url = "https://example.com/a.tar.gz"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_filter_spec_flattened() {
        let cfg = parse(
            r#"
            [settings]
            directory = "/opt/apps"

            [apps.tool.git]
            url = "https://example.com/tool.git"
            filters = ['^v([0-9.]+)$']
            sort = "rsemver"
            download_url = "https://example.com/tool-{{ tag }}.tar.gz"
            "#,
        )
        .unwrap();
        let Source::Git(git) = &cfg.apps["tool"].source else {
            panic!("expected git source");
        };
        assert_eq!(git.filter.sort, SortMode::Rsemver);
        assert_eq!(git.filter.filters.len(), 1);
    }

    #[test]
    fn test_steps_accept_shell_and_argv() {
        let def: ApplicationDef = toml::from_str(
            r#"
            build = ["make", ["make", "install"]]
            [static]
            tag = "1"
            url = "u"
            "#,
        )
        .unwrap();
        assert_eq!(def.build[0].argv(), vec!["sh", "-c", "make"]);
        assert_eq!(def.build[1].argv(), vec!["make", "install"]);
    }

    #[test]
    fn test_restrict() {
        let mut cfg = parse(
            r#"
            [settings]
            directory = "/opt/apps"
            [apps.a.static]
            tag = "1"
            [apps.b.static]
            tag = "1"
            [apps.c.static]
            tag = "1"
            "#,
        )
        .unwrap();
        cfg.restrict(&["a".to_string(), "b".to_string()], &["b".to_string()])
            .unwrap();
        let enabled: Vec<_> = cfg.enabled().map(|a| a.name.as_str()).collect();
        assert_eq!(enabled, vec!["a"]);
        assert_eq!(cfg.excluded.iter().collect::<Vec<_>>(), vec!["b", "c"]);
        assert!(cfg.apps.values().all(|a| a.enablement == Enablement::Enabled));

        assert_eq!(
            cfg.restrict(&["zzz".to_string()], &[]).unwrap_err(),
            ConfigError::UnknownApplication("zzz".to_string())
        );
    }
}
