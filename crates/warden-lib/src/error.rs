//! Error types for the remediation and persistence paths

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a remediation step
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixError {
    #[error("failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` exited with code {code:?}: {output}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("service exited before becoming ready (code {code:?})")]
    ExitedEarly { code: Option<i32> },

    #[error("failed to clear cache at {path:?}: {reason}")]
    CacheClear { path: PathBuf, reason: String },

    #[error("no automated remediation for {0}")]
    Unsupported(String),

    #[error("remediation aborted: {0}")]
    Aborted(String),
}

/// Failure writing to the audit trail
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl AuditError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuditError::Io {
            path: path.into(),
            source,
        }
    }
}

/// An event was fed to a remediation workflow in a state that does not accept it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid remediation transition: {event} while {state}")]
pub struct TransitionError {
    pub state: String,
    pub event: String,
}
