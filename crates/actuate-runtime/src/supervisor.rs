//! Lifecycle shared by the action and background orchestrators.
//!
//! Each orchestrator owns its own supervisor: the set of collaborators
//! already submitted, the stop signal their loops watch, and the bounded
//! pool the loops run on.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use actuate_core::Result;

use crate::pool::WorkerPool;
use crate::signal::StopSignal;
use crate::types::LoopReport;
use crate::worker::{LoopMonitor, Step, WorkerLoop};

/// Pool size for `collaborators` loops: `min(max_workers, collaborators)`, at least 1.
pub fn worker_count(max_workers: usize, collaborators: usize) -> usize {
    max_workers.min(collaborators).max(1)
}

pub struct Supervisor {
    kind: &'static str,
    pool: WorkerPool,
    stop: StopSignal,
    retry_delay: Duration,
    submitted: HashSet<String>,
    monitors: Vec<Arc<LoopMonitor>>,
    stopped: bool,
}

impl Supervisor {
    /// `kind` names the collaborators in logs ("Connector", "Background").
    pub fn new(
        kind: &'static str,
        thread_prefix: &str,
        collaborators: usize,
        max_workers: usize,
        retry_delay: Duration,
    ) -> Result<Self> {
        let pool = WorkerPool::new(worker_count(max_workers, collaborators), thread_prefix)?;
        Ok(Self {
            kind,
            pool,
            stop: StopSignal::new(),
            retry_delay,
            submitted: HashSet::new(),
            monitors: Vec::new(),
            stopped: false,
        })
    }

    /// Submit one worker loop per collaborator not yet submitted.
    ///
    /// Collaborators are keyed by [`Step::identity`]; repeats are skipped
    /// with a warning, so calling this again is harmless. Returns how many
    /// loops were newly submitted.
    pub fn start<I>(&mut self, steps: I) -> usize
    where
        I: IntoIterator<Item = Arc<dyn Step>>,
    {
        if self.stopped {
            warn!("{} supervisor already stopped, not starting loops", self.kind);
            return 0;
        }

        let mut launched = 0;
        for step in steps {
            let identity = step.identity().to_string();
            if self.submitted.contains(&identity) {
                warn!("{} {} already submitted, skipping.", self.kind, identity);
                continue;
            }

            let worker = WorkerLoop::new(step, self.stop.clone(), self.retry_delay);
            let monitor = worker.monitor();
            if let Err(e) = self.pool.execute(move || {
                worker.run();
            }) {
                warn!("{} {} could not be submitted: {}", self.kind, identity, e);
                continue;
            }

            self.monitors.push(monitor);
            self.submitted.insert(identity);
            launched += 1;
        }

        if launched > 0 {
            info!(
                "{} loops started: {} new, {} total on {} threads",
                self.kind,
                launched,
                self.submitted.len(),
                self.pool.size()
            );
        }
        launched
    }

    /// Signal every loop and block until all have exited.
    ///
    /// No timeout: a step that never returns keeps this call waiting.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.stop.signal();
        self.pool.shutdown();
        info!("{} loops stopped ({} total)", self.kind, self.submitted.len());
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.len()
    }

    pub fn is_submitted(&self, identity: &str) -> bool {
        self.submitted.contains(identity)
    }

    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    /// Lets another thread request shutdown without waiting for the loops.
    /// `stop()` still has to run to join them.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Current state and counters of every submitted loop, in submission order.
    pub fn statuses(&self) -> Vec<LoopReport> {
        self.monitors.iter().map(|m| m.snapshot()).collect()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use crate::worker::LoopState;

    struct Idle(String);

    impl Step for Idle {
        fn identity(&self) -> &str {
            &self.0
        }

        fn step(&self, stop: &StopSignal) -> std::result::Result<(), StepError> {
            stop.wait_timeout(Duration::from_millis(5));
            Ok(())
        }
    }

    fn idle(name: &str) -> Arc<dyn Step> {
        Arc::new(Idle(name.to_string()))
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(12, 0), 1);
        assert_eq!(worker_count(12, 3), 3);
        assert_eq!(worker_count(12, 40), 12);
        assert_eq!(worker_count(2, 5), 2);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut sup = Supervisor::new("Test", "sup-test-", 2, 12, Duration::from_millis(1)).unwrap();

        assert_eq!(sup.start(vec![idle("a"), idle("b")]), 2);
        assert_eq!(sup.start(vec![idle("a"), idle("b")]), 0);
        assert_eq!(sup.submitted_count(), 2);
        assert_eq!(sup.statuses().len(), 2);

        sup.stop();
        assert!(sup.is_stopped());
        for status in sup.statuses() {
            assert_eq!(status.state, LoopState::Stopped);
        }
    }

    #[test]
    fn test_duplicate_identity_in_one_call() {
        let mut sup = Supervisor::new("Test", "sup-dup-", 2, 12, Duration::from_millis(1)).unwrap();
        assert_eq!(sup.start(vec![idle("odom"), idle("odom")]), 1);
        assert!(sup.is_submitted("odom"));
        sup.stop();
    }

    #[test]
    fn test_start_after_stop_submits_nothing() {
        let mut sup = Supervisor::new("Test", "sup-stopped-", 1, 12, Duration::from_millis(1)).unwrap();
        sup.stop();
        assert_eq!(sup.start(vec![idle("late")]), 0);
        assert_eq!(sup.submitted_count(), 0);
    }

    #[test]
    fn test_excess_loops_queue_behind_pool() {
        let mut sup = Supervisor::new("Test", "sup-small-", 3, 1, Duration::from_millis(1)).unwrap();
        assert_eq!(sup.worker_count(), 1);
        assert_eq!(sup.start(vec![idle("a"), idle("b"), idle("c")]), 3);

        std::thread::sleep(Duration::from_millis(20));
        let statuses = sup.statuses();
        assert_eq!(statuses[0].state, LoopState::Running);
        assert_eq!(statuses[1].state, LoopState::Queued);
        assert_eq!(statuses[2].state, LoopState::Queued);

        sup.stop();
        for status in sup.statuses() {
            assert_eq!(status.state, LoopState::Stopped);
        }
        assert_eq!(sup.statuses()[1].iterations, 0);
    }
}
