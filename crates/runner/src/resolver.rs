//! Command resolution with caching and clean PATH handling
//!
//! This is the `which` the tracer uses to turn bare command names such as
//! `hadoop` or `javap` into absolute paths.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::trace;

/// Forces cache invalidation when set
pub const CACHE_BUST_VAR: &str = "PATCHER_CACHE_BUST";

/// Resolution cache to avoid repeated stat() calls
static RESOLUTION_CACHE: Lazy<RwLock<HashMap<String, Option<PathBuf>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Resolve `command` against the current `PATH`.
///
/// Commands containing a path separator are not searched; they resolve to
/// themselves when executable.
pub fn which(command: &str) -> Option<PathBuf> {
    if command.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(command);
        return is_executable(&path).then_some(path);
    }
    let search_paths = build_search_path(env::var("PATH").ok());
    resolve_command(command, &search_paths)
}

/// Resolve the binary for a command within `search_paths`, with caching
pub fn resolve_command(command: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let use_cache = env::var(CACHE_BUST_VAR).is_err();
    let cache_key = build_cache_key(command, search_paths);

    if use_cache {
        if let Ok(cache) = RESOLUTION_CACHE.read() {
            if let Some(cached_result) = cache.get(&cache_key) {
                return cached_result.clone();
            }
        }
    }

    let result = resolve_command_uncached(command, search_paths);
    trace!(command, resolved = ?result, "resolved command");

    if use_cache {
        if let Ok(mut cache) = RESOLUTION_CACHE.write() {
            cache.insert(cache_key, result.clone());
        }
    }

    result
}

/// Split a PATH value into absolute, existing, de-duplicated directories.
pub fn build_search_path(path_var: Option<String>) -> Vec<PathBuf> {
    let Some(path_str) = path_var else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    path_str
        .split(':')
        .map(|s| s.trim_end_matches('/'))
        .filter(|p| !p.is_empty())
        .filter(|p| {
            let pb = Path::new(p);
            pb.is_absolute() && pb.is_dir()
        })
        .filter(|p| seen.insert(p.to_string()))
        .map(PathBuf::from)
        .collect()
}

fn build_cache_key(command: &str, search_paths: &[PathBuf]) -> String {
    let normalized_paths: Vec<String> = search_paths
        .iter()
        .map(|p| p.display().to_string().trim_end_matches('/').to_string())
        .collect();

    format!("{}:{}", command, normalized_paths.join(":"))
}

fn resolve_command_uncached(command: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    search_paths
        .iter()
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

/// Check if a path is an executable regular file (symlinks followed)
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|metadata| metadata.is_file() && (metadata.permissions().mode() & 0o111 != 0))
        .unwrap_or(false)
}
