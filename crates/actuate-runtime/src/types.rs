//! Runtime types.

use serde::Serialize;

use crate::error::ActionError;
use crate::worker::LoopState;

/// A connector call that returned successfully.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    /// Binding label the action was routed to.
    pub label: String,
    /// Action value after shorthand expansion.
    pub value: String,
    /// The typed input handed to the connector, rendered as JSON.
    pub input: serde_json::Value,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
}

/// Terminal state of one dispatched action.
pub type ActionResult = Result<ActionOutcome, ActionError>;

/// Point-in-time view of a worker loop.
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    pub identity: String,
    pub state: LoopState,
    pub iterations: u64,
    pub failures: u64,
}
