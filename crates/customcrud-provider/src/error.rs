use std::fmt;

use customcrud_exec::{ExecError, ExecutionResult, EXIT_CODE_SIGNALLED};
use thiserror::Error;

use crate::hooks::{CrudOp, HookError};

/// Masked diagnostics attached to every failed phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureReport {
    /// `-1` when the process never exited normally.
    pub exit_code: i32,
    pub masked_stdout: String,
    pub masked_stderr: String,
    pub masked_payload: String,
}

impl FailureReport {
    pub(crate) fn from_result(result: &ExecutionResult) -> Self {
        Self {
            exit_code: result.exit_code,
            masked_stdout: result.masked_stdout.clone(),
            masked_stderr: result.masked_stderr.clone(),
            masked_payload: result.masked_payload.clone(),
        }
    }

    /// Report for a failure that happened before any process output existed.
    pub(crate) fn from_payload(masked_payload: String) -> Self {
        Self {
            exit_code: EXIT_CODE_SIGNALLED,
            masked_payload,
            ..Self::default()
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Exit Code: {}\nStdout: {}\nStderr: {}\nInput Payload: {}",
            self.exit_code, self.masked_stdout, self.masked_stderr, self.masked_payload
        )
    }
}

/// Errors raised by a single dispatched phase.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid {op} Command: {source}")]
    Configuration {
        op: CrudOp,
        #[source]
        source: HookError,
    },
    #[error("{op} Script Failed: {source}\n{report}")]
    ScriptFailed {
        op: CrudOp,
        #[source]
        source: ExecError,
        report: FailureReport,
    },
    #[error("{op} Script Failed: {source}\n{report}")]
    OutputContract {
        op: CrudOp,
        #[source]
        source: ExecError,
        report: FailureReport,
    },
    #[error("{op} Script Failed: {name} script returned nil output\n{report}", name = .op.as_str())]
    EmptyOutput { op: CrudOp, report: FailureReport },
    #[error("Create Script Error: Create script must return an 'id' field\n{report}")]
    MissingId { report: FailureReport },
    #[error("{op} Script Cancelled: script execution was cancelled\n{report}")]
    Cancelled { op: CrudOp, report: FailureReport },
    #[error("Invalid {op} Input: write-only input {message}")]
    InvalidWriteOnlyInput { op: CrudOp, message: String },
    #[error("Invalid Import JSON: {message}")]
    InvalidImport { message: String },
    #[error("Import Read Failed: {source}")]
    ImportRead {
        #[source]
        source: Box<DispatchError>,
    },
    #[error("Private State Error ({key}): {message}")]
    PrivateState { key: &'static str, message: String },
}

impl DispatchError {
    /// Classifies a hook execution failure for `op`.
    pub(crate) fn from_exec(op: CrudOp, error: ExecError, masked_payload: String) -> Self {
        let report = match error.result() {
            Some(result) => FailureReport::from_result(result),
            None => FailureReport::from_payload(masked_payload),
        };
        match error {
            ExecError::Cancelled { .. } => Self::Cancelled { op, report },
            ExecError::InvalidOutput { .. } => Self::OutputContract {
                op,
                source: error,
                report,
            },
            _ => Self::ScriptFailed {
                op,
                source: error,
                report,
            },
        }
    }

    pub fn op(&self) -> Option<CrudOp> {
        match self {
            Self::Configuration { op, .. }
            | Self::ScriptFailed { op, .. }
            | Self::OutputContract { op, .. }
            | Self::EmptyOutput { op, .. }
            | Self::InvalidWriteOnlyInput { op, .. }
            | Self::Cancelled { op, .. } => Some(*op),
            Self::MissingId { .. } => Some(CrudOp::Create),
            Self::ImportRead { .. } => Some(CrudOp::Read),
            Self::InvalidImport { .. } | Self::PrivateState { .. } => None,
        }
    }

    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            Self::ScriptFailed { report, .. }
            | Self::OutputContract { report, .. }
            | Self::EmptyOutput { report, .. }
            | Self::MissingId { report }
            | Self::Cancelled { report, .. } => Some(report),
            Self::ImportRead { source } => source.report(),
            Self::Configuration { .. }
            | Self::InvalidWriteOnlyInput { .. }
            | Self::InvalidImport { .. }
            | Self::PrivateState { .. } => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.report().map(|report| report.exit_code)
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::ImportRead { source } => source.is_cancelled(),
            _ => false,
        }
    }
}
