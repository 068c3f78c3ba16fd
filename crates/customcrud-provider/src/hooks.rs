use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle phase a hook implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudOp {
    Create,
    Read,
    Update,
    Delete,
    Open,
    Renew,
    Close,
}

impl CrudOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Open => "open",
            Self::Renew => "renew",
            Self::Close => "close",
        }
    }

    /// Title-cased name used in operator-facing diagnostics.
    pub const fn title(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Read => "Read",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Open => "Open",
            Self::Renew => "Renew",
            Self::Close => "Close",
        }
    }

    /// Whether a successful run may print nothing.
    pub(crate) const fn tolerates_empty_output(self) -> bool {
        matches!(self, Self::Delete | Self::Renew | Self::Close)
    }
}

impl fmt::Display for CrudOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Kind of managed object, which decides the hooks it must declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Resource,
    DataSource,
    Lease,
}

impl ObjectKind {
    pub const fn required_ops(self) -> &'static [CrudOp] {
        match self {
            Self::Resource => &[CrudOp::Create, CrudOp::Read, CrudOp::Delete],
            Self::DataSource => &[CrudOp::Read],
            Self::Lease => &[CrudOp::Open],
        }
    }

    pub const fn optional_ops(self) -> &'static [CrudOp] {
        match self {
            Self::Resource => &[CrudOp::Update],
            Self::DataSource => &[],
            Self::Lease => &[CrudOp::Renew, CrudOp::Close],
        }
    }

    pub fn supports(self, op: CrudOp) -> bool {
        self.required_ops().contains(&op) || self.optional_ops().contains(&op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("{name} command cannot be empty", name = .op.as_str())]
    Empty { op: CrudOp },
    #[error("failed to parse {name} command: {message}", name = .op.as_str())]
    Parse { op: CrudOp, message: String },
    #[error("{name} hook is not valid for a {kind:?}", name = .op.as_str())]
    Unsupported { op: CrudOp, kind: ObjectKind },
}

impl HookError {
    pub fn op(&self) -> CrudOp {
        match self {
            Self::Empty { op } | Self::Parse { op, .. } | Self::Unsupported { op, .. } => *op,
        }
    }
}

/// Command strings for each lifecycle phase.
///
/// Strings are kept verbatim and only split into an argument vector when a
/// phase actually runs, so a malformed optional hook never blocks the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudHooks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<String>,
}

impl CrudHooks {
    pub fn command(&self, op: CrudOp) -> Option<&str> {
        match op {
            CrudOp::Create => self.create.as_deref(),
            CrudOp::Read => self.read.as_deref(),
            CrudOp::Update => self.update.as_deref(),
            CrudOp::Delete => self.delete.as_deref(),
            CrudOp::Open => self.open.as_deref(),
            CrudOp::Renew => self.renew.as_deref(),
            CrudOp::Close => self.close.as_deref(),
        }
    }

    pub fn with_command(mut self, op: CrudOp, command: impl Into<String>) -> Self {
        let slot = match op {
            CrudOp::Create => &mut self.create,
            CrudOp::Read => &mut self.read,
            CrudOp::Update => &mut self.update,
            CrudOp::Delete => &mut self.delete,
            CrudOp::Open => &mut self.open,
            CrudOp::Renew => &mut self.renew,
            CrudOp::Close => &mut self.close,
        };
        *slot = Some(command.into());
        self
    }

    /// True when a non-blank command is set for `op`.
    pub fn is_configured(&self, op: CrudOp) -> bool {
        self.command(op)
            .is_some_and(|command| !command.trim().is_empty())
    }

    /// Splits the hook for `op` into an argument vector with shell quoting rules.
    pub fn resolve(&self, op: CrudOp) -> Result<Vec<String>, HookError> {
        let command = self.command(op).unwrap_or_default();
        let argv = shell_words::split(command).map_err(|error| HookError::Parse {
            op,
            message: error.to_string(),
        })?;
        if argv.is_empty() {
            return Err(HookError::Empty { op });
        }
        Ok(argv)
    }

    /// Checks that every required hook of `kind` is present and that no hook
    /// from another kind is set.
    pub fn validate(&self, kind: ObjectKind) -> Result<(), HookError> {
        for op in kind.required_ops() {
            if !self.is_configured(*op) {
                return Err(HookError::Empty { op: *op });
            }
        }
        let all = [
            CrudOp::Create,
            CrudOp::Read,
            CrudOp::Update,
            CrudOp::Delete,
            CrudOp::Open,
            CrudOp::Renew,
            CrudOp::Close,
        ];
        match all
            .into_iter()
            .find(|op| self.command(*op).is_some() && !kind.supports(*op))
        {
            Some(op) => Err(HookError::Unsupported { op, kind }),
            None => Ok(()),
        }
    }
}
