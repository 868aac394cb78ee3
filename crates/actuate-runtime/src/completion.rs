//! Per-cycle completion signals used to order dependent actions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Single-use gate: Pending until [`signal`](Self::signal), then Signaled for good.
///
/// One writer (the action owning the label), any number of waiters.
#[derive(Clone)]
pub struct CompletionGate {
    tx: Arc<watch::Sender<bool>>,
}

impl CompletionGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn signal(&self) {
        self.tx.send_if_modified(|done| !std::mem::replace(done, true));
    }

    pub fn is_signaled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the gate is signaled (immediately if it already is).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionGate")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

/// Gates for every action label in one `promise()` batch.
///
/// Each cycle gets a fresh table. Tasks hold an `Arc` to the table of the
/// cycle that spawned them, so a later cycle never swaps gates out from
/// under tasks that are still waiting.
#[derive(Debug, Default)]
pub struct CompletionTable {
    cycle: u64,
    gates: HashMap<String, CompletionGate>,
}

impl CompletionTable {
    pub fn new<I, S>(cycle: u64, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let gates = labels
            .into_iter()
            .map(|label| (label.into(), CompletionGate::new()))
            .collect();
        Self { cycle, gates }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn contains(&self, label: &str) -> bool {
        self.gates.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn is_signaled(&self, label: &str) -> bool {
        self.gates.get(label).is_some_and(|g| g.is_signaled())
    }

    /// Mark `label` complete. Labels outside this cycle are ignored.
    pub fn signal(&self, label: &str) {
        if let Some(gate) = self.gates.get(label) {
            gate.signal();
            debug!(cycle = self.cycle, "Action '{}' completed", label);
        }
    }

    /// Wait for each prerequisite of `label` that is part of this cycle.
    ///
    /// Prerequisites outside the batch count as already satisfied.
    pub async fn wait_for(&self, label: &str, prerequisites: &[String]) {
        for dep in prerequisites {
            if let Some(gate) = self.gates.get(dep) {
                debug!(cycle = self.cycle, "Action '{}' waiting for dependency '{}'", label, dep);
                gate.wait().await;
            }
        }
    }
}

/// Signals a label when dropped, so dependents are released even if the
/// owning task unwinds.
pub(crate) struct SignalOnDrop {
    table: Arc<CompletionTable>,
    label: String,
}

impl SignalOnDrop {
    pub(crate) fn new(table: Arc<CompletionTable>, label: String) -> Self {
        Self { table, label }
    }
}

impl Drop for SignalOnDrop {
    fn drop(&mut self) {
        self.table.signal(&self.label);
    }
}
