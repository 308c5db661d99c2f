use std::path::{Path, PathBuf};

use updo_schema::{APP_NAME, IndexMode};

/// Default configuration file: `$XDG_CONFIG_HOME/updo/config.toml`.
///
/// Returns `None` if no configuration directory can be determined.
pub fn default_config_path(config_dir: Option<PathBuf>) -> Option<PathBuf> {
    config_dir.map(|d| d.join(APP_NAME).join("config.toml"))
}

/// PID lock file inside the managed root: `<root>/.updo.lock`.
pub fn lock_path(root: &Path) -> PathBuf {
    root.join(format!(".{APP_NAME}.lock"))
}

/// Incremental index file inside the managed root.
pub fn index_path(root: &Path, mode: IndexMode) -> PathBuf {
    root.join(mode.file_name(APP_NAME))
}

/// Work directory of one application: `<root>/<name>`.
pub fn app_dir(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

/// Extract the filename from a URL, ignoring any query string or fragment.
pub fn filename_from_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].trim_end_matches('/').rsplit('/').next().unwrap_or("")
}
