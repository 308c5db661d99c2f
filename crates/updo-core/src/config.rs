//! Configuration file loading.
//!
//! The main file carries `[settings]` and may `include` glob patterns (relative
//! to its own directory) naming further files that contribute `[apps.*]`
//! tables. Validation happens once, after every table is merged.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use updo_schema::{AppsDef, Config, ConfigDef, ConfigError};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid include pattern '{0}': {1}")]
    Pattern(String, #[source] glob::PatternError),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

pub fn load(path: &Path) -> Result<Config, LoadError> {
    let mut def: ConfigDef = parse(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    for pattern in std::mem::take(&mut def.include) {
        let full = if Path::new(&pattern).is_absolute() {
            pattern.clone()
        } else {
            base.join(&pattern).to_string_lossy().to_string()
        };
        let matches = glob::glob(&full).map_err(|e| LoadError::Pattern(pattern.clone(), e))?;
        for entry in matches.flatten() {
            debug!(include = %entry.display(), "loading included config");
            let extra: AppsDef = parse(&entry)?;
            for (name, app) in extra.apps {
                if def.apps.contains_key(&name) {
                    return Err(ConfigError::Duplicate(name).into());
                }
                def.apps.insert(name, app);
            }
        }
    }

    Ok(Config::try_from(def)?)
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|e| LoadError::Read(path.to_path_buf(), e))?;
    toml::from_str(&raw).map_err(|e| LoadError::Parse(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MAIN: &str = r#"
include = ["apps.d/*.toml"]

[settings]
directory = "/opt/apps"
parallelization = 2

[apps.rg.github]
project = "BurntSushi/ripgrep"
asset = "musl"
"#;

    #[test]
    fn test_load_with_includes() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("apps.d")).unwrap();
        fs::write(tmp.path().join("config.toml"), MAIN).unwrap();
        fs::write(
            tmp.path().join("apps.d/tools.toml"),
            "[apps.jq.static]\ntag = \"1.7\"\nurl = \"https://example.com/jq\"\n",
        )
        .unwrap();

        let cfg = load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(cfg.settings.parallelization, 2);
        assert_eq!(cfg.apps.keys().collect::<Vec<_>>(), vec!["jq", "rg"]);
    }

    #[test]
    fn test_duplicate_across_files() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("apps.d")).unwrap();
        fs::write(tmp.path().join("config.toml"), MAIN).unwrap();
        fs::write(
            tmp.path().join("apps.d/dup.toml"),
            "[apps.rg.static]\ntag = \"1\"\nurl = \"https://example.com/rg\"\n",
        )
        .unwrap();

        let err = load(&tmp.path().join("config.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Invalid(ConfigError::Duplicate(ref n)) if n == "rg"));
    }

    #[test]
    fn test_invalid_application() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            "[settings]\ndirectory = \"/x\"\n[apps.empty]\npriority = 1\n",
        )
        .unwrap();
        let err = load(&tmp.path().join("config.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Invalid(ConfigError::NoSource(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = load(Path::new("/nonexistent/updo.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Read(..)));
    }
}
