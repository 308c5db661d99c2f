//! Resolved artifacts and their on-disk placement.
//!
//! A fetch strategy produces a [`Resource`]; [`Resource::set_app_data`] binds it
//! to an application's work directory exactly once, yielding a
//! [`PlacedResource`] whose paths and extraction policy are fixed for the rest
//! of the pipeline.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use updo_schema::Extraction;

use crate::backend::{BackendError, Invocation, Retriever, StepRunner};
use crate::io::archive::{self, ArchiveError, ArchiveKind, TAR_STRIP_FLAG};
use crate::template::{self, TemplateContext, TemplateError};

/// Hex characters of the content hash used in archive and unpack names.
pub const HASH_LEN: usize = 8;

const INPUT_KEY: &str = "input";
const OUTPUT_KEY: &str = "output";

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("no extraction command known for '{0}'")]
    NoExtractor(String),

    #[error("extraction command must reference {{{{ {placeholder} }}}}: {command:?}")]
    MissingPlaceholder {
        placeholder: &'static str,
        command: Vec<String>,
    },

    #[error("extraction program '{0}' not found in PATH")]
    MissingProgram(String),

    #[error("empty extraction command")]
    EmptyCommand,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Artifact as produced by a fetch strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: String,
    pub file: String,
    pub tag: String,
}

/// How the archive is unpacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractCommand {
    /// No command is known for this file.
    Skip,
    /// Command template with `{{ input }}` and `{{ output }}` placeholders.
    Command(Vec<String>),
}

/// A [`Resource`] bound to an application work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedResource {
    pub resource: Resource,
    pub archive: PathBuf,
    pub unpack: PathBuf,
    pub extract: ExtractCommand,
    pub kind: Option<ArchiveKind>,
    pub strip: bool,
}

/// Rendered extraction invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractPlan {
    pub argv: Vec<String>,
    /// Move a single root directory up after the command finishes.
    pub hoist: bool,
}

impl Resource {
    pub fn new(url: impl Into<String>, file: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            file: file.into(),
            tag: tag.into(),
        }
    }

    /// Short hash of `file`, `tag` and `url`.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.file.as_bytes());
        hasher.update(self.tag.as_bytes());
        hasher.update(self.url.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..HASH_LEN].to_string()
    }

    /// Derive paths and the extraction policy.
    ///
    /// Archive: `work_dir/{hash}.{file}`. Unpack: `work_dir/{hash}.{name}.{tag}`.
    pub fn set_app_data(self, name: &str, work_dir: &Path, extraction: &Extraction) -> PlacedResource {
        let hash = self.content_hash();
        let archive = work_dir.join(format!("{hash}.{}", clean(&self.file)));
        let unpack = work_dir.join(format!("{hash}.{name}.{}", clean(&self.tag)));
        let kind = ArchiveKind::detect(&self.file);
        let extract = match (&extraction.command, kind) {
            (Some(cmd), _) => ExtractCommand::Command(cmd.clone()),
            (None, Some(kind)) => ExtractCommand::Command(kind.default_command()),
            (None, None) => ExtractCommand::Skip,
        };
        PlacedResource {
            resource: self,
            archive,
            unpack,
            extract,
            kind,
            strip: !extraction.disable_strip,
        }
    }
}

/// Replace characters that are unsafe in file names with `_`.
pub fn clean(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl PlacedResource {
    pub fn tag(&self) -> &str {
        &self.resource.tag
    }

    pub fn is_unpacked(&self) -> bool {
        self.unpack.exists()
    }

    /// File names inside the work directory that belong to this release.
    pub fn owned_names(&self) -> Vec<String> {
        [&self.archive, &self.unpack]
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect()
    }

    /// Bind path-related template keys.
    pub fn bind(&self, ctx: &mut TemplateContext) {
        ctx.set_tag(&self.resource.tag);
        ctx.set("url", self.resource.url.clone());
        ctx.set("file", self.resource.file.clone());
        ctx.set("archive", self.archive.to_string_lossy());
        ctx.set("unpack", self.unpack.to_string_lossy());
    }

    /// Render the extraction command.
    ///
    /// Fails for [`ExtractCommand::Skip`] and for templates missing either
    /// placeholder. With `strip`, `tar` gets its strip flag and any other
    /// program is marked for hoisting.
    pub fn extract_plan(&self, strip: bool, ctx: &TemplateContext) -> Result<ExtractPlan, ResourceError> {
        let ExtractCommand::Command(command) = &self.extract else {
            return Err(ResourceError::NoExtractor(self.resource.file.clone()));
        };
        if command.is_empty() {
            return Err(ResourceError::EmptyCommand);
        }
        for placeholder in [INPUT_KEY, OUTPUT_KEY] {
            if !command.iter().any(|arg| template::keys(arg).contains(&placeholder)) {
                return Err(ResourceError::MissingPlaceholder {
                    placeholder,
                    command: command.clone(),
                });
            }
        }

        let ctx = ctx
            .clone()
            .with(INPUT_KEY, self.archive.to_string_lossy())
            .with(OUTPUT_KEY, self.unpack.to_string_lossy());
        let mut argv = template::render_all(command, &ctx)?;

        let mut hoist = false;
        if strip {
            if is_tar(&argv[0]) {
                argv.push(TAR_STRIP_FLAG.to_string());
            } else {
                hoist = true;
            }
        }
        Ok(ExtractPlan { argv, hoist })
    }

    /// List the archive and decide whether to strip its root directory.
    pub async fn should_strip(&self, retriever: &dyn Retriever) -> Result<bool, ResourceError> {
        if !self.strip {
            return Ok(false);
        }
        let Some(kind) = self.kind else {
            return Ok(false);
        };
        let entries = archive::list_entries(kind, &self.archive, retriever).await?;
        let strip = archive::needs_strip(&entries);
        debug!(archive = %self.archive.display(), entries = entries.len(), strip, "depth check");
        Ok(strip)
    }

    /// Unpack the archive into [`Self::unpack`].
    pub async fn extract(
        &self,
        retriever: &dyn Retriever,
        runner: &dyn StepRunner,
        ctx: &TemplateContext,
    ) -> Result<(), ResourceError> {
        let strip = self.should_strip(retriever).await?;
        let plan = self.extract_plan(strip, ctx)?;
        which::which(&plan.argv[0]).map_err(|_| ResourceError::MissingProgram(plan.argv[0].clone()))?;

        tokio::fs::create_dir_all(&self.unpack).await?;
        let unpacked = async {
            runner.run(&Invocation::new(plan.argv)).await?;
            if plan.hoist {
                let unpack = self.unpack.clone();
                tokio::task::spawn_blocking(move || archive::hoist_single_root(&unpack))
                    .await
                    .map_err(|e| std::io::Error::other(e.to_string()))??;
            }
            Ok::<(), ResourceError>(())
        }
        .await;
        self.discard_on_error(unpacked).await
    }

    /// Place a non-archive download into [`Self::unpack`] as-is.
    pub async fn install_plain(&self) -> Result<(), ResourceError> {
        tokio::fs::create_dir_all(&self.unpack).await?;
        let dest = self.unpack.join(clean(&self.resource.file));
        let copied = tokio::fs::copy(&self.archive, dest).await.map(|_| ()).map_err(ResourceError::from);
        self.discard_on_error(copied).await
    }

    /// A present unpack dir means "installed", so a failed unpack must not leave one.
    async fn discard_on_error(&self, result: Result<(), ResourceError>) -> Result<(), ResourceError> {
        if result.is_err() {
            let _ = tokio::fs::remove_dir_all(&self.unpack).await;
        }
        result
    }
}

fn is_tar(program: &str) -> bool {
    let base = Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    base == "tar" || base == "bsdtar"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res() -> Resource {
        Resource::new(
            "https://example.com/dl/tool-1.0.tar.gz?x=1",
            "tool-1.0.tar.gz",
            "v1.0",
        )
    }

    #[test]
    fn test_naming_is_deterministic() {
        let dir = Path::new("/opt/apps/tool");
        let a = res().set_app_data("tool", dir, &Extraction::default());
        let b = res().set_app_data("tool", dir, &Extraction::default());
        assert_eq!(a.archive, b.archive);
        assert_eq!(a.unpack, b.unpack);

        let hash = res().content_hash();
        assert_eq!(hash.len(), HASH_LEN);
        assert_eq!(a.archive, dir.join(format!("{hash}.tool-1.0.tar.gz")));
        assert_eq!(a.unpack, dir.join(format!("{hash}.tool.v1.0")));
    }

    #[test]
    fn test_hash_depends_on_all_parts() {
        let base = res().content_hash();
        let mut other = res();
        other.tag = "v1.1".to_string();
        assert_ne!(base, other.content_hash());
        let mut other = res();
        other.url.push('2');
        assert_ne!(base, other.content_hash());
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("a b/c:d.tar.gz"), "a_b_c_d.tar.gz");
        assert_eq!(clean("v1.2.3-rc_1"), "v1.2.3-rc_1");
    }

    #[test]
    fn test_extractor_selection() {
        let dir = Path::new("/w");
        let tgz = res().set_app_data("t", dir, &Extraction::default());
        assert_eq!(tgz.extract, ExtractCommand::Command(ArchiveKind::TarGz.default_command()));

        let bin = Resource::new("https://e/x", "x", "1").set_app_data("t", dir, &Extraction::default());
        assert_eq!(bin.extract, ExtractCommand::Skip);
        assert!(matches!(
            bin.extract_plan(false, &TemplateContext::new("t")),
            Err(ResourceError::NoExtractor(_))
        ));

        let custom = Extraction {
            command: Some(vec!["7z".into(), "x".into(), "{{input}}".into(), "-o{{output}}".into()]),
            disable_strip: true,
        };
        let placed = res().set_app_data("t", dir, &custom);
        assert!(!placed.strip);
        assert!(matches!(placed.extract, ExtractCommand::Command(ref c) if c[0] == "7z"));
    }

    #[test]
    fn test_plan_tar_strip() {
        let placed = res().set_app_data("tool", Path::new("/w"), &Extraction::default());
        let ctx = TemplateContext::new("tool");

        let plan = placed.extract_plan(true, &ctx).unwrap();
        assert_eq!(plan.argv[0], "tar");
        assert_eq!(plan.argv[2], placed.archive.to_string_lossy());
        assert_eq!(plan.argv.last().unwrap(), TAR_STRIP_FLAG);
        assert!(!plan.hoist);

        let plan = placed.extract_plan(false, &ctx).unwrap();
        assert!(!plan.argv.iter().any(|a| a == TAR_STRIP_FLAG));
    }

    #[test]
    fn test_plan_zip_hoists() {
        let placed = Resource::new("https://e/a.zip", "a.zip", "1")
            .set_app_data("a", Path::new("/w"), &Extraction::default());
        let plan = placed.extract_plan(true, &TemplateContext::new("a")).unwrap();
        assert_eq!(plan.argv[0], "unzip");
        assert!(plan.hoist);
    }

    #[test]
    fn test_plan_requires_placeholders() {
        let extraction = Extraction {
            command: Some(vec!["tar".into(), "-xf".into(), "{{ input }}".into()]),
            disable_strip: false,
        };
        let placed = res().set_app_data("t", Path::new("/w"), &extraction);
        let err = placed.extract_plan(false, &TemplateContext::new("t")).unwrap_err();
        assert!(matches!(err, ResourceError::MissingPlaceholder { placeholder: "output", .. }));
    }

    #[test]
    fn test_owned_names() {
        let placed = res().set_app_data("tool", Path::new("/w"), &Extraction::default());
        let names = placed.owned_names();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with(".tool-1.0.tar.gz"));
        assert!(names[1].ends_with(".tool.v1.0"));
    }

    #[tokio::test]
    async fn test_failed_plain_install_leaves_no_unpack_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let plain = Resource::new("https://example.com/tool", "tool", "v1").set_app_data(
            "tool",
            tmp.path(),
            &Extraction::default(),
        );
        // Archive was never downloaded, so the copy fails.
        assert!(plain.install_plain().await.is_err());
        assert!(!plain.unpack.exists());

        std::fs::write(&plain.archive, b"bin").unwrap();
        plain.install_plain().await.unwrap();
        assert_eq!(std::fs::read(plain.unpack.join("tool")).unwrap(), b"bin");
    }
}
