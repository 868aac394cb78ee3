//! Action orchestrator: routes each cycle's actions to their connectors.
//!
//! Supports three execution modes:
//! - concurrent: every action is spawned at once (default)
//! - sequential: actions run one after another in batch order
//! - dependencies: every action is spawned at once, but waits for its
//!   configured prerequisites in the same batch before calling its connector
//!
//! Dispatch never blocks on a connector except in sequential mode, so one
//! hung connector (or a dependency cycle) only stalls the tasks waiting on
//! it. `flush()` has no timeout and will wait for those.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use actuate_core::action::normalize;
use actuate_core::{Action, ExecutionMode, Result, RuntimeConfig};

use crate::completion::{CompletionTable, SignalOnDrop};
use crate::connector::{ActionBinding, ActionRegistry};
use crate::error::ActionError;
use crate::signal::StopSignal;
use crate::supervisor::Supervisor;
use crate::types::{ActionResult, LoopReport};

/// A dispatched action whose task may still be running.
#[derive(Debug)]
pub struct PendingAction {
    label: String,
    handle: JoinHandle<ActionResult>,
}

impl PendingAction {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task. A panic or abort inside it becomes [`ActionError::Aborted`].
    pub async fn join(self) -> ActionResult {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(ActionError::Aborted {
                label: self.label,
                reason: e.to_string(),
            }),
        }
    }
}

/// Entry in the promise queue.
#[derive(Debug)]
enum Promise {
    Running(PendingAction),
    /// Already awaited during dispatch (sequential mode).
    Settled(ActionResult),
}

impl Promise {
    async fn settle(self) -> ActionResult {
        match self {
            Self::Running(pending) => pending.join().await,
            Self::Settled(result) => result,
        }
    }
}

pub struct ActionOrchestrator {
    mode: ExecutionMode,
    registry: Arc<ActionRegistry>,
    dependencies: HashMap<String, Vec<String>>,
    completions: Arc<CompletionTable>,
    cycle: u64,
    promise_queue: Vec<Promise>,
    supervisor: Supervisor,
}

impl ActionOrchestrator {
    /// Build an orchestrator for `registry` using the mode, dependency
    /// graph and pool sizing from `config`.
    pub fn new(config: &RuntimeConfig, registry: ActionRegistry) -> Result<Self> {
        let supervisor = Supervisor::new(
            "Connector",
            "action-orchestrator-connector-",
            registry.len(),
            config.max_workers,
            config.retry_delay(),
        )?;

        let dependencies = config
            .action_dependencies
            .iter()
            .map(|(label, deps)| {
                let deps = deps.iter().map(|d| d.to_lowercase()).collect();
                (label.to_lowercase(), deps)
            })
            .collect();

        info!(
            "ActionOrchestrator initialized: mode={}, {} actions, {} workers",
            config.action_execution_mode,
            registry.len(),
            supervisor.worker_count()
        );

        Ok(Self {
            mode: config.action_execution_mode,
            registry: Arc::new(registry),
            dependencies,
            completions: Arc::new(CompletionTable::default()),
            cycle: 0,
            promise_queue: Vec::new(),
            supervisor,
        })
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Number of `promise()` calls so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Completion table of the most recent cycle.
    pub fn completions(&self) -> Arc<CompletionTable> {
        self.completions.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.promise_queue.len()
    }

    // ---------------------------------------------------------------
    // Connector loops
    // ---------------------------------------------------------------

    /// Start one tick loop per bound connector. Repeated calls only start
    /// loops for labels not yet submitted.
    pub fn start(&mut self) -> usize {
        let tickers: Vec<_> = self.registry.iter().map(ActionBinding::ticker).collect();
        self.supervisor.start(tickers)
    }

    /// Stop every connector loop and wait for them to exit.
    pub fn stop(&mut self) {
        self.supervisor.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.supervisor.is_stopped()
    }

    /// Request stop without blocking; loops report `Stopping` until `stop()` joins them.
    pub fn stop_signal(&self) -> StopSignal {
        self.supervisor.stop_signal()
    }

    pub fn submitted_count(&self) -> usize {
        self.supervisor.submitted_count()
    }

    pub fn connector_statuses(&self) -> Vec<LoopReport> {
        self.supervisor.statuses()
    }

    // ---------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------

    /// Hand a batch of actions to their connectors.
    ///
    /// Shorthand actions are expanded first. Unknown actions are skipped
    /// with a warning, and a fresh completion table is built from the
    /// remaining labels, so a dependency on an unbound label never blocks.
    pub async fn promise(&mut self, actions: Vec<Action>) {
        let resolved: Vec<(Action, ActionBinding)> = actions
            .into_iter()
            .map(normalize)
            .filter_map(|action| {
                let binding = self.registry.resolve(&action).cloned()?;
                Some((action, binding))
            })
            .collect();

        self.cycle += 1;
        self.completions = Arc::new(CompletionTable::new(
            self.cycle,
            resolved.iter().map(|(_, binding)| binding.label().to_string()),
        ));

        match self.mode {
            ExecutionMode::Concurrent => self.promise_concurrent(resolved),
            ExecutionMode::Sequential => self.promise_sequential(resolved).await,
            ExecutionMode::Dependencies => self.promise_with_dependencies(resolved),
        }
    }

    fn promise_concurrent(&mut self, resolved: Vec<(Action, ActionBinding)>) {
        for (action, binding) in resolved {
            debug!("Sending command: {}", action);
            let label = binding.label().to_string();
            let handle = tokio::spawn(async move { binding.call(&action).await });
            self.promise_queue
                .push(Promise::Running(PendingAction { label, handle }));
        }
    }

    async fn promise_sequential(&mut self, resolved: Vec<(Action, ActionBinding)>) {
        for (action, binding) in resolved {
            debug!("Sending command (sequential): {}", action);
            let label = binding.label().to_string();
            let handle = tokio::spawn(async move { binding.call(&action).await });
            let result = PendingAction {
                label: label.clone(),
                handle,
            }
            .join()
            .await;

            self.completions.signal(&label);
            self.promise_queue.push(Promise::Settled(result));
        }
    }

    fn promise_with_dependencies(&mut self, resolved: Vec<(Action, ActionBinding)>) {
        for (action, binding) in resolved {
            debug!("Sending command (with dependencies): {}", action);
            let label = binding.label().to_string();
            let prerequisites = self.dependencies.get(&label).cloned().unwrap_or_default();
            let table = self.completions.clone();
            let task_label = label.clone();

            let handle = tokio::spawn(async move {
                table.wait_for(&task_label, &prerequisites).await;
                let _done = SignalOnDrop::new(table.clone(), task_label);
                binding.call(&action).await
            });
            self.promise_queue
                .push(Promise::Running(PendingAction { label, handle }));
        }
    }

    /// Wait for every queued action and drain the queue.
    ///
    /// Returns `(completed, pending)` in dispatch order. Since this waits
    /// for all tasks, `pending` is empty unless a caller-side cancellation
    /// interrupts the wait.
    pub async fn flush(&mut self) -> (Vec<ActionResult>, Vec<PendingAction>) {
        if self.promise_queue.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let queue = std::mem::take(&mut self.promise_queue);
        let completed = futures::future::join_all(queue.into_iter().map(Promise::settle)).await;
        (completed, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Connector;
    use crate::error::ConnectorError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Command {
        action: String,
    }

    fn command(value: &str) -> std::result::Result<Command, String> {
        Ok(Command {
            action: value.to_string(),
        })
    }

    #[derive(Default)]
    struct Log {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Connector for Log {
        type Input = Command;

        fn name(&self) -> &str {
            "log"
        }

        async fn connect(&self, input: Command) -> std::result::Result<(), ConnectorError> {
            if input.action == "explode" {
                panic!("connector exploded");
            }
            self.calls.lock().push(input.action);
            Ok(())
        }

        fn tick(&self) -> std::result::Result<(), ConnectorError> {
            std::thread::sleep(std::time::Duration::from_millis(1));
            Ok(())
        }
    }

    fn orchestrator(mode: ExecutionMode, deps: &[(&str, &[&str])]) -> (ActionOrchestrator, Arc<Log>) {
        let log = Arc::new(Log::default());
        let mut registry = ActionRegistry::new();
        registry
            .register(ActionBinding::new("move", log.clone(), command))
            .unwrap();
        registry
            .register(ActionBinding::new("speak", log.clone(), command))
            .unwrap();

        let config = RuntimeConfig {
            action_execution_mode: mode,
            action_dependencies: deps
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect(),
            ..RuntimeConfig::default()
        };
        (ActionOrchestrator::new(&config, registry).unwrap(), log)
    }

    #[tokio::test]
    async fn test_flush_empty_queue() {
        let (mut orch, _) = orchestrator(ExecutionMode::Concurrent, &[]);
        let (done, pending) = orch.flush().await;
        assert!(done.is_empty());
        assert!(pending.is_empty());

        let (done, pending) = orch.flush().await;
        assert!(done.is_empty());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_dispatches_nothing() {
        let (mut orch, log) = orchestrator(ExecutionMode::Concurrent, &[]);
        orch.promise(vec![Action::new("levitate", "")]).await;
        assert_eq!(orch.pending_count(), 0);

        let (done, _) = orch.flush().await;
        assert!(done.is_empty());
        assert!(log.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shorthand_routed_to_move() {
        let (mut orch, log) = orchestrator(ExecutionMode::Concurrent, &[]);
        orch.promise(vec![Action::new("Turn Left", "")]).await;

        let (done, _) = orch.flush().await;
        let outcome = done[0].as_ref().unwrap();
        assert_eq!(outcome.label, "move");
        assert_eq!(outcome.input, serde_json::json!({"action": "turn left"}));
        assert_eq!(*log.calls.lock(), vec!["turn left".to_string()]);
    }

    #[tokio::test]
    async fn test_flush_drains_queue() {
        let (mut orch, _) = orchestrator(ExecutionMode::Concurrent, &[]);
        orch.promise(vec![Action::new("speak", "hi"), Action::new("move", "stand still")])
            .await;
        assert_eq!(orch.pending_count(), 2);

        let (done, pending) = orch.flush().await;
        assert_eq!(done.len(), 2);
        assert!(pending.is_empty());
        assert_eq!(orch.pending_count(), 0);
        assert!(done.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_panicking_connector_is_isolated() {
        let (mut orch, log) = orchestrator(ExecutionMode::Concurrent, &[]);
        orch.promise(vec![Action::new("move", "explode"), Action::new("speak", "still here")])
            .await;

        let (done, _) = orch.flush().await;
        assert!(matches!(done[0], Err(ActionError::Aborted { .. })));
        assert!(done[1].is_ok());
        assert_eq!(*log.calls.lock(), vec!["still here".to_string()]);
    }

    #[tokio::test]
    async fn test_sequential_settles_during_promise() {
        let (mut orch, log) = orchestrator(ExecutionMode::Sequential, &[]);
        orch.promise(vec![Action::new("speak", "one"), Action::new("move", "two")])
            .await;

        assert_eq!(*log.calls.lock(), vec!["one".to_string(), "two".to_string()]);
        let table = orch.completions();
        assert!(table.is_signaled("speak"));
        assert!(table.is_signaled("move"));

        let (done, _) = orch.flush().await;
        assert_eq!(done.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_prerequisite_still_releases_dependents() {
        let (mut orch, log) = orchestrator(ExecutionMode::Dependencies, &[("speak", &["move"])]);
        orch.promise(vec![Action::new("move", "explode"), Action::new("speak", "after")])
            .await;

        let (done, _) = tokio::time::timeout(std::time::Duration::from_secs(5), orch.flush())
            .await
            .expect("dependent deadlocked");
        assert!(done[0].is_err());
        assert!(done[1].is_ok());
        assert_eq!(*log.calls.lock(), vec!["after".to_string()]);
    }

    #[tokio::test]
    async fn test_table_only_holds_bound_labels() {
        let (mut orch, _) = orchestrator(ExecutionMode::Dependencies, &[("speak", &["levitate"])]);
        orch.promise(vec![Action::new("levitate", ""), Action::new("speak", "hi")])
            .await;

        let table = orch.completions();
        assert!(!table.contains("levitate"));
        assert!(table.contains("speak"));
        assert_eq!(table.len(), 1);
        orch.flush().await;
    }

    #[tokio::test]
    async fn test_each_cycle_gets_new_table() {
        let (mut orch, _) = orchestrator(ExecutionMode::Dependencies, &[]);
        orch.promise(vec![Action::new("speak", "a")]).await;
        let first = orch.completions();
        orch.flush().await;

        orch.promise(vec![Action::new("move", "b")]).await;
        let second = orch.completions();
        orch.flush().await;

        assert_eq!(first.cycle(), 1);
        assert_eq!(second.cycle(), 2);
        assert!(first.is_signaled("speak"));
        assert!(!second.contains("speak"));
        assert!(second.is_signaled("move"));
    }

    #[test]
    fn test_start_and_stop_connector_loops() {
        let (mut orch, _) = orchestrator(ExecutionMode::Concurrent, &[]);
        assert_eq!(orch.start(), 2);
        assert_eq!(orch.start(), 0);
        assert_eq!(orch.submitted_count(), 2);
        orch.stop();
        assert_eq!(orch.connector_statuses().len(), 2);
    }
}
