use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::paths;

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_DEPTH: usize = 8;
pub const DEFAULT_TRACE_SHELL: &str = "bash";

/// Serialization format of the per-command result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}

impl OutputFormat {
    /// Convert format to its canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }

    /// File extension used for result files in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yml",
            Self::Json => "json",
        }
    }

    /// Parse a format name (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective settings for a patcher run.
///
/// `format` stays a raw name here; it is validated once, when the result
/// store is built, so an unusable format is reported before any tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatcherSettings {
    pub output_dir: PathBuf,
    pub format: String,
    pub timeout: Option<Duration>,
    pub stream: bool,
    pub trace_shell: String,
    pub max_depth: usize,
    pub keep_scripts: bool,
}

impl Default for PatcherSettings {
    fn default() -> Self {
        Self {
            output_dir: env::temp_dir(),
            format: OutputFormat::Yaml.as_str().to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            stream: true,
            trace_shell: DEFAULT_TRACE_SHELL.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            keep_scripts: false,
        }
    }
}

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub output_dir: Option<PathBuf>,
    pub format: Option<String>,
    pub timeout_secs: Option<u64>,
    pub stream: Option<bool>,
    pub trace_shell: Option<String>,
    pub max_depth: Option<usize>,
    pub keep_scripts: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    output_dir: Option<PathBuf>,
    format: Option<String>,
    timeout_secs: Option<u64>,
    stream: Option<bool>,
    trace_shell: Option<String>,
    max_depth: Option<usize>,
    keep_scripts: Option<bool>,
}

impl From<SettingsFile> for SettingsOverrides {
    fn from(file: SettingsFile) -> Self {
        Self {
            output_dir: file.output_dir,
            format: file.format,
            timeout_secs: file.timeout_secs,
            stream: file.stream,
            trace_shell: file.trace_shell,
            max_depth: file.max_depth,
            keep_scripts: file.keep_scripts,
        }
    }
}

impl PatcherSettings {
    /// Resolve settings: CLI, then config file, then environment, then defaults.
    ///
    /// `config_path` replaces the default `<PATCHER_HOME>/config.yaml`.
    pub fn resolve(cli: SettingsOverrides, config_path: Option<&Path>) -> Result<Self> {
        let file = match config_path {
            Some(path) => load_settings_file(path)?,
            None => load_settings_file(&paths::config_file()?)?,
        };
        let from_env = load_env_settings()?;
        Ok(Self::layer(cli, file, from_env))
    }

    fn layer(cli: SettingsOverrides, file: SettingsOverrides, env: SettingsOverrides) -> Self {
        let defaults = Self::default();
        let timeout_secs = cli
            .timeout_secs
            .or(file.timeout_secs)
            .or(env.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            output_dir: cli
                .output_dir
                .or(file.output_dir)
                .or(env.output_dir)
                .unwrap_or(defaults.output_dir),
            format: cli.format.or(file.format).or(env.format).unwrap_or(defaults.format),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            stream: cli.stream.or(file.stream).or(env.stream).unwrap_or(defaults.stream),
            trace_shell: cli
                .trace_shell
                .or(file.trace_shell)
                .or(env.trace_shell)
                .unwrap_or(defaults.trace_shell),
            max_depth: cli
                .max_depth
                .or(file.max_depth)
                .or(env.max_depth)
                .unwrap_or(defaults.max_depth),
            keep_scripts: cli
                .keep_scripts
                .or(file.keep_scripts)
                .or(env.keep_scripts)
                .unwrap_or(defaults.keep_scripts),
        }
    }
}

fn load_settings_file(path: &Path) -> Result<SettingsOverrides> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(SettingsOverrides::default()),
        Ok(contents) => {
            let file: SettingsFile = serde_yaml::from_str(&contents)
                .with_context(|| format!("invalid YAML in {}", path.display()))?;
            debug!(path = %path.display(), "loaded settings file");
            Ok(file.into())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(SettingsOverrides::default()),
        Err(err) => Err(anyhow!("failed to read {}: {err}", path.display())),
    }
}

fn load_env_settings() -> Result<SettingsOverrides> {
    let mut partial = SettingsOverrides::default();

    if let Some(dir) = non_empty_var("PATCHER_OUTPUT_DIR") {
        partial.output_dir = Some(PathBuf::from(dir));
    }
    if let Some(format) = non_empty_var("PATCHER_FORMAT") {
        partial.format = Some(format);
    }
    if let Some(raw) = non_empty_var("PATCHER_TIMEOUT_SECS") {
        partial.timeout_secs = Some(parse_number("PATCHER_TIMEOUT_SECS", &raw)?);
    }
    if let Some(raw) = non_empty_var("PATCHER_STREAM") {
        partial.stream = Some(parse_bool("PATCHER_STREAM", &raw)?);
    }
    if let Some(shell) = non_empty_var("PATCHER_TRACE_SHELL") {
        partial.trace_shell = Some(shell);
    }
    if let Some(raw) = non_empty_var("PATCHER_MAX_DEPTH") {
        partial.max_depth = Some(parse_number("PATCHER_MAX_DEPTH", &raw)?);
    }
    if let Some(raw) = non_empty_var("PATCHER_KEEP_SCRIPTS") {
        partial.keep_scripts = Some(parse_bool("PATCHER_KEEP_SCRIPTS", &raw)?);
    }

    Ok(partial)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| anyhow!("{key} must be a non-negative integer (found {raw})"))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => bail!("{key} must be true/false/1/0 (found {other})"),
    }
}
