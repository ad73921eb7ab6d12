use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const PATCHER_DIR_NAME: &str = ".patcher";
pub const HOME_OVERRIDE_VAR: &str = "PATCHER_HOME";
pub const RESULTS_PREFIX: &str = "patcher_results";

/// `$PATCHER_HOME` when set to something other than blanks, else `~/.patcher`.
pub fn patcher_home() -> Result<PathBuf> {
    home_from(env::var(HOME_OVERRIDE_VAR).ok(), dirs::home_dir())
}

fn home_from(override_dir: Option<String>, user_home: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = override_dir.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    user_home
        .map(|home| home.join(PATCHER_DIR_NAME))
        .with_context(|| format!("cannot locate a home directory; set {HOME_OVERRIDE_VAR}"))
}

pub fn config_file() -> Result<PathBuf> {
    Ok(patcher_home()?.join("config.yaml"))
}

/// Result file for one traced command: `<dir>/patcher_results-<command>.<ext>`.
///
/// Only the final path component of `command` is used, so `/usr/bin/hadoop`
/// and `hadoop` land in the same file.
pub fn results_file(output_dir: &Path, command: &str, extension: &str) -> PathBuf {
    let name = Path::new(command)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "command".to_string());
    output_dir.join(format!("{RESULTS_PREFIX}-{name}.{extension}"))
}
