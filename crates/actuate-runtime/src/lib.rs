//! Actuate runtime: action dispatch and long-lived worker loops.
//!
//! Two independent halves share one lifecycle primitive:
//! - [`ActionOrchestrator`] routes each cycle's actions to their connectors
//!   under a concurrent, sequential or dependency-ordered policy.
//! - [`BackgroundOrchestrator`] keeps background pollers running.
//!
//! Both own a [`Supervisor`] that runs one [`WorkerLoop`] per collaborator
//! on a bounded pool of OS threads until stopped.

pub mod background;
pub mod completion;
pub mod connector;
pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod signal;
pub mod supervisor;
pub mod types;
pub mod worker;

pub use background::{Background, BackgroundOrchestrator};
pub use completion::{CompletionGate, CompletionTable};
pub use connector::{ActionBinding, ActionRegistry, Connector, InputSchema};
pub use error::{ActionError, ConnectorError, StepError};
pub use orchestrator::ActionOrchestrator;
pub use pool::WorkerPool;
pub use signal::StopSignal;
pub use supervisor::Supervisor;
pub use types::*;
pub use worker::{Iteration, LoopState, Step, WorkerLoop};
