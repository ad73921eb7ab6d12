use patcher_runner::ProcessError;
use std::io;
use std::path::PathBuf;

use crate::exec::ExecEvent;

/// Every way a single command's trace can abort.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// A traced command (or the shell running it) could not be started.
    #[error(transparent)]
    ProcessSpawn(#[from] ProcessError),

    /// More than one hand-off where exactly one was expected, or a final
    /// hand-off whose arguments still name a script.
    #[error("ambiguous exec chain: {reason} ({} event(s); review manually)", events.len())]
    AmbiguousExecChain {
        reason: String,
        events: Vec<ExecEvent>,
    },

    /// The chain reached a JVM launch, which is where tracing stops.
    #[error("exec target `{target}` is a JVM launch and needs manual inspection")]
    UnsupportedTerminal { target: String },

    #[error("no serializer available for output format `{format}`")]
    SerializationUnavailable { format: String },

    #[error("exec chain deeper than {max_depth} levels (next target `{target}`)")]
    DepthExceeded { max_depth: usize, target: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize trace results: {0}")]
    Serialize(String),
}

impl TraceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
