use patcher_common::OutputFormat;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::TraceError;
use crate::tracer::TraceResult;

/// Writes trace results in one structured format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultStore {
    format: OutputFormat,
}

impl ResultStore {
    /// Pick a store by format name. Fails when the name is unknown or the
    /// serializer for it was not compiled in.
    pub fn for_format(name: &str) -> Result<Self, TraceError> {
        let unavailable = || TraceError::SerializationUnavailable {
            format: name.to_string(),
        };
        let format: OutputFormat = name.parse().map_err(|_| unavailable())?;
        if format == OutputFormat::Yaml && !cfg!(feature = "yaml") {
            return Err(unavailable());
        }
        Ok(Self { format })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// `<dir>/patcher_results-<basename>.<ext>`
    pub fn results_path(&self, output_dir: &Path, command: &str) -> PathBuf {
        patcher_common::paths::results_file(output_dir, command, self.format.extension())
    }

    pub fn render(&self, result: &TraceResult) -> Result<String, TraceError> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result)
                .map(|mut text| {
                    text.push('\n');
                    text
                })
                .map_err(|e| TraceError::Serialize(e.to_string())),
            OutputFormat::Yaml => render_yaml(result),
        }
    }

    /// Render and write atomically, creating `path`'s directory if needed.
    pub fn save(&self, result: &TraceResult, path: &Path) -> Result<(), TraceError> {
        let text = self.render(result)?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| TraceError::io(&parent, e))?;

        let mut file = NamedTempFile::new_in(&parent).map_err(|e| TraceError::io(&parent, e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| TraceError::io(file.path(), e))?;
        file.persist(path)
            .map_err(|e| TraceError::io(path, e.error))?;

        debug!(path = %path.display(), format = %self.format, "saved trace results");
        Ok(())
    }
}

#[cfg(feature = "yaml")]
fn render_yaml(result: &TraceResult) -> Result<String, TraceError> {
    serde_yaml::to_string(result).map_err(|e| TraceError::Serialize(e.to_string()))
}

#[cfg(not(feature = "yaml"))]
fn render_yaml(_result: &TraceResult) -> Result<String, TraceError> {
    Err(TraceError::SerializationUnavailable {
        format: OutputFormat::Yaml.to_string(),
    })
}
