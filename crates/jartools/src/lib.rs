//! JAR API signature tooling.
//!
//! [`dump`] turns a JAR into a map of class entry to `javap` output; [`diff`]
//! compares two such maps and reports classes whose public surface lost
//! members. Together they answer "is the jar on this cluster a drop-in
//! replacement for the one I built against?".

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

pub mod diff;
pub mod dump;

pub use diff::{diff_signatures, load_signatures, DiffReport, SignatureChange};
pub use dump::{default_output_path, write_signatures, JarDumper};

/// Class entry name (`org/example/Foo.class`) to `javap` signature text.
pub type SignatureMap = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum JarError {
    #[error("`{tool}` not found on PATH")]
    ToolNotFound { tool: String },

    #[error(transparent)]
    Process(#[from] patcher_runner::ProcessError),

    #[error("`{command}` exited with {exit_code}: {output}")]
    ToolFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a signature dump: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
