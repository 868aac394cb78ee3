//! Failures local to one connector, one loop iteration or one action.
//!
//! None of these reach the orchestrators' control flow; they are logged
//! and handed back to whoever awaits the work.

use thiserror::Error;

/// A connector could not carry out a call or a tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("{0}")]
    Failed(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// One worker loop iteration failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("connector: {0}")]
    Connector(#[from] ConnectorError),
}

/// A dispatched action did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("invalid input for action '{label}': {reason}")]
    InvalidInput { label: String, reason: String },

    #[error("action '{label}' failed: {source}")]
    Connector {
        label: String,
        source: ConnectorError,
    },

    #[error("action '{label}' aborted: {reason}")]
    Aborted { label: String, reason: String },
}

impl ActionError {
    pub fn label(&self) -> &str {
        match self {
            Self::InvalidInput { label, .. }
            | Self::Connector { label, .. }
            | Self::Aborted { label, .. } => label,
        }
    }
}
