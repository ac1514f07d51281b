//! Error types for the build pipeline

use thiserror::Error;

/// Failures surfaced by the launcher.
///
/// Stream read failures are deliberately absent: the pump treats them like
/// end of stream and reports them through the normal terminal marker.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The child process could not be launched
    #[error("failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    /// The discovery invocation failed or exited non-zero
    #[error("target discovery failed: {0}")]
    Discovery(String),

    /// Accumulated output was not valid UTF-8
    #[error("Error decoding output using utf-8 - {0}")]
    Decode(String),

    /// Manual edit attempted while streamed output owns the console
    #[error("console is read-only")]
    ReadOnly,

    #[error("no catalog entry at index {0}")]
    NoSuchEntry(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub(crate) fn spawn(command: &[String], reason: impl ToString) -> Self {
        Self::Spawn {
            command: command.join(" "),
            reason: reason.to_string(),
        }
    }
}
