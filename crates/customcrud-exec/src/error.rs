use thiserror::Error;

use crate::payload::ExecutionResult;

/// Failure modes of a single hook invocation.
///
/// Variants raised after the process was spawned carry the partially
/// populated [`ExecutionResult`] so callers can still branch on the exit code
/// and report captured output.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to marshal payload: {0}")]
    SerializePayload(#[source] serde_json::Error),
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("hook process i/o failed: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        result: Box<ExecutionResult>,
    },
    #[error("script execution failed with exit code {exit_code}")]
    NonZeroExit {
        exit_code: i32,
        result: Box<ExecutionResult>,
    },
    #[error("failed to parse script output: {source}")]
    InvalidOutput {
        #[source]
        source: serde_json::Error,
        result: Box<ExecutionResult>,
    },
    #[error("script execution was cancelled")]
    Cancelled { result: Box<ExecutionResult> },
}

impl ExecError {
    /// Returns the captured invocation state when the process got that far.
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::EmptyCommand | Self::SerializePayload(_) | Self::Spawn { .. } => None,
            Self::Io { result, .. }
            | Self::NonZeroExit { result, .. }
            | Self::InvalidOutput { result, .. }
            | Self::Cancelled { result } => Some(result),
        }
    }

    /// Returns the process exit code, or `None` if no process ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { exit_code, .. } => Some(*exit_code),
            Self::InvalidOutput { result, .. } => Some(result.exit_code),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
