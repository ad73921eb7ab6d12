//! Script-versus-binary classification via `file(1)`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::resolver::is_executable;

/// `file -b` descriptions that mean "run this with a shell": named shell
/// interpreters, plus executable text with no interpreter line at all.
static SHELL_SCRIPT_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bshell script\b|\b(?:ba|da|k|z)?sh script\b|^(?:ASCII|UTF-8(?: Unicode)?) text executable",
    )
    .expect("shell script signature regex is valid")
});

/// Decides whether an exec target is another script to descend into.
pub trait ScriptProbe {
    fn is_script(&self, path: &str) -> bool;

    fn is_executable(&self, path: &str) -> bool {
        is_executable(Path::new(path))
    }
}

impl<T: ScriptProbe + ?Sized> ScriptProbe for &T {
    fn is_script(&self, path: &str) -> bool {
        (**self).is_script(path)
    }

    fn is_executable(&self, path: &str) -> bool {
        (**self).is_executable(path)
    }
}

/// Classifies by running the system `file` utility.
#[derive(Debug, Clone)]
pub struct FileProbe {
    tool: PathBuf,
}

impl Default for FileProbe {
    fn default() -> Self {
        Self {
            tool: PathBuf::from("file"),
        }
    }
}

impl FileProbe {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }

    /// Raw `file -b -L` description, or `None` if the tool could not say.
    pub fn describe(&self, path: &Path) -> Option<String> {
        let output = Command::new(&self.tool)
            .arg("-b")
            .arg("-L")
            .arg(path)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(output) => {
                debug!(path = %path.display(), status = ?output.status, "file(1) failed");
                None
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "could not run file(1)");
                None
            }
        }
    }
}

impl ScriptProbe for FileProbe {
    /// Missing paths and inspection failures count as "not a script", which
    /// ends recursion instead of looping.
    fn is_script(&self, path: &str) -> bool {
        let path = Path::new(path);
        if !path.exists() {
            return false;
        }
        self.describe(path)
            .map(|description| is_shell_script_description(&description))
            .unwrap_or(false)
    }
}

pub fn is_shell_script_description(description: &str) -> bool {
    SHELL_SCRIPT_SIGNATURE.is_match(description.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_shell_descriptions() {
        for description in [
            "Bourne-Again shell script text executable",
            "Bourne-Again shell script, ASCII text executable",
            "POSIX shell script, ASCII text executable",
            "a /usr/bin/env bash script, ASCII text executable",
            "ASCII text executable",
            "UTF-8 Unicode text executable, with very long lines",
        ] {
            assert!(is_shell_script_description(description), "{description}");
        }
    }

    #[test]
    fn test_non_shell_descriptions() {
        for description in [
            "ELF 64-bit LSB executable, x86-64, dynamically linked",
            "Python script, ASCII text executable",
            "ASCII text",
            "symbolic link to /etc/alternatives/hadoop",
            "cannot open `/nope' (No such file or directory)",
        ] {
            assert!(!is_shell_script_description(description), "{description}");
        }
    }

    #[test]
    fn test_missing_path_is_not_a_script() {
        let probe = FileProbe::default();
        assert!(!probe.is_script("/definitely/not/a/real/hadoop"));
    }

    #[test]
    fn test_missing_file_tool_is_not_a_script() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("wrapper");
        fs::write(&script, "#!/bin/bash\necho hi\n").unwrap();

        let probe = FileProbe::new("/nonexistent/file-tool");
        assert!(!probe.is_script(&script.display().to_string()));
    }

    #[test]
    fn test_classifies_real_script_when_file_available() {
        let probe = FileProbe::default();
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("wrapper");
        fs::write(&script, "#!/bin/bash\nexec /bin/true \"$@\"\n").unwrap();

        let Some(description) = probe.describe(&script) else {
            eprintln!("file(1) unavailable; skipping");
            return;
        };
        assert!(is_shell_script_description(&description), "{description}");
        assert!(probe.is_script(&script.display().to_string()));
    }
}
