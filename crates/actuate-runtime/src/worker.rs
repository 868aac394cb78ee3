//! Worker loop: call a collaborator's step until stopped, surviving failures.
//!
//! There is no retry budget: a step that fails on every call is retried
//! forever at the fixed `retry_delay`, until the stop signal fires.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::error::StepError;
use crate::signal::StopSignal;
use crate::types::LoopReport;

/// Something a worker loop can drive: a connector's tick or a background's run.
pub trait Step: Send + Sync {
    /// Unique name, used to deduplicate submissions and in logs.
    fn identity(&self) -> &str;

    /// One unit of work. Should return in bounded time; `stop` is provided
    /// so long waits can bail out early.
    fn step(&self, stop: &StopSignal) -> Result<(), StepError>;
}

/// Outcome of a single iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    Completed,
    Failed(String),
}

/// Lifecycle of one loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    /// Submitted, waiting for a pool thread.
    Queued,
    Running,
    /// Stop requested; the current iteration is finishing.
    Stopping,
    Stopped,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Live counters for one loop, readable from other threads.
#[derive(Debug)]
pub struct LoopMonitor {
    identity: String,
    stop: StopSignal,
    state: AtomicU8,
    iterations: AtomicU64,
    failures: AtomicU64,
}

impl LoopMonitor {
    pub fn new(identity: impl Into<String>, stop: StopSignal) -> Self {
        Self {
            identity: identity.into(),
            stop,
            state: AtomicU8::new(LoopState::Queued as u8),
            iterations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// A running loop whose stop signal has fired reports `Stopping`
    /// until its in-flight iteration returns.
    pub fn state(&self) -> LoopState {
        match LoopState::from_u8(self.state.load(Ordering::SeqCst)) {
            LoopState::Running if self.stop.is_signaled() => LoopState::Stopping,
            state => state,
        }
    }

    fn set_state(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> LoopReport {
        LoopReport {
            identity: self.identity.clone(),
            state: self.state(),
            iterations: self.iterations.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
        }
    }
}

/// Drives one [`Step`] on the current thread until the stop signal fires.
pub struct WorkerLoop {
    step: Arc<dyn Step>,
    stop: StopSignal,
    retry_delay: Duration,
    monitor: Arc<LoopMonitor>,
}

impl WorkerLoop {
    pub fn new(step: Arc<dyn Step>, stop: StopSignal, retry_delay: Duration) -> Self {
        let monitor = Arc::new(LoopMonitor::new(step.identity(), stop.clone()));
        Self {
            step,
            stop,
            retry_delay,
            monitor,
        }
    }

    pub fn monitor(&self) -> Arc<LoopMonitor> {
        self.monitor.clone()
    }

    pub fn state(&self) -> LoopState {
        self.monitor.state()
    }

    /// Run one iteration, turning errors and panics into [`Iteration::Failed`].
    pub fn iterate(&self) -> Iteration {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.step.step(&self.stop)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(StepError::Panicked(panic_message(payload.as_ref()))),
        };
        match result {
            Ok(()) => Iteration::Completed,
            Err(e) => Iteration::Failed(e.to_string()),
        }
    }

    /// Record an iteration. Returns the pause to take before the next one.
    pub fn record(&self, iteration: &Iteration) -> Option<Duration> {
        self.monitor.iterations.fetch_add(1, Ordering::SeqCst);
        match iteration {
            Iteration::Completed => None,
            Iteration::Failed(reason) => {
                self.monitor.failures.fetch_add(1, Ordering::SeqCst);
                error!(worker = %self.step.identity(), "Error in worker loop: {}", reason);
                Some(self.retry_delay)
            }
        }
    }

    /// Loop until stopped. Shutdown is cooperative: a stop requested
    /// mid-iteration takes effect once that iteration returns.
    pub fn run(self) -> LoopReport {
        self.monitor.set_state(LoopState::Running);
        debug!(worker = %self.step.identity(), "Worker loop started");

        while !self.stop.is_signaled() {
            let iteration = self.iterate();
            if let Some(pause) = self.record(&iteration) {
                self.stop.wait_timeout(pause);
            }
        }

        debug!(worker = %self.step.identity(), "Worker loop stopped");
        self.monitor.set_state(LoopState::Stopped);
        self.monitor.snapshot()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
