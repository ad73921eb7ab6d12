use similar::{ChangeTag, TextDiff};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::{JarError, SignatureMap};

/// A class whose signature lost at least one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureChange {
    pub class: String,
    /// Unified diff, old dump first
    pub diff: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// Label of the dump being checked against
    pub other: String,
    /// Classes of the first dump that the second lacks, sorted
    pub missing: Vec<String>,
    pub changed: Vec<SignatureChange>,
}

impl DiffReport {
    /// Nothing removed and no signature lost a member.
    pub fn is_compatible(&self) -> bool {
        self.missing.is_empty() && self.changed.is_empty()
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in &self.missing {
            writeln!(f, "{} does not contain {}", self.other, class)?;
        }
        for change in &self.changed {
            writeln!(f, "signature of {} differs", change.class)?;
            f.write_str(&change.diff)?;
        }
        Ok(())
    }
}

pub fn load_signatures(path: &Path) -> Result<SignatureMap, JarError> {
    let text = fs::read_to_string(path).map_err(|source| JarError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| JarError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Compare dump `a` against dump `b`.
///
/// Additions in `b` are compatible and ignored; a changed class is only
/// reported when its diff removes something.
pub fn diff_signatures(a: &SignatureMap, b: &SignatureMap, b_label: &str) -> DiffReport {
    let mut report = DiffReport {
        other: b_label.to_string(),
        ..DiffReport::default()
    };

    for (class, old) in a {
        let Some(new) = b.get(class) else {
            report.missing.push(class.clone());
            continue;
        };
        if old == new {
            continue;
        }

        let diff = TextDiff::from_lines(old.as_str(), new.as_str());
        let removes = diff
            .iter_all_changes()
            .any(|change| change.tag() == ChangeTag::Delete);
        if removes {
            report.changed.push(SignatureChange {
                class: class.clone(),
                diff: diff.unified_diff().context_radius(3).header("", "").to_string(),
            });
        }
    }

    report
}
