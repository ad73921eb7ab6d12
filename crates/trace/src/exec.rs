use serde::Serialize;

/// One hand-off from a running script to another executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecEvent {
    /// Script that performed the hand-off, when known
    pub origin: Option<String>,
    /// Zero-based line index in the trace or script it was found in
    pub line: Option<usize>,
    pub target: String,
    /// Argument text exactly as the trace printed it, whitespace-normalized
    pub args: String,
}

impl ExecEvent {
    pub fn new(line: usize, target: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            origin: None,
            line: Some(line),
            target: target.into(),
            args: args.into(),
        }
    }

    /// Event used to re-enter a script during recursion; it has no position.
    pub fn reentry(target: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            origin: None,
            line: None,
            target: target.into(),
            args: args.into(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Fill in `origin` only if the event does not carry one yet.
    pub fn or_origin(mut self, origin: Option<&str>) -> Self {
        if self.origin.is_none() {
            self.origin = origin.map(str::to_string);
        }
        self
    }

    /// JVM launches end the chain and are never re-exec'd generically.
    pub fn is_jvm_launch(&self) -> bool {
        self.target.contains("java")
    }
}

/// Strip one layer of matching single or double quotes from a shell word.
pub(crate) fn unquote(word: &str) -> &str {
    for quote in ['\'', '"'] {
        if word.len() >= 2 && word.starts_with(quote) && word.ends_with(quote) {
            return &word[1..word.len() - 1];
        }
    }
    word
}
