//! Runtime configuration: execution mode, dependency graph, bindings, backgrounds.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// How a batch of actions is scheduled onto connectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Every action dispatched at once, no ordering.
    #[default]
    Concurrent,
    /// One action at a time, in batch order.
    Sequential,
    /// Dispatched at once, each waiting on its configured prerequisites.
    Dependencies,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concurrent => write!(f, "concurrent"),
            Self::Sequential => write!(f, "sequential"),
            Self::Dependencies => write!(f, "dependencies"),
        }
    }
}

/// Which connector plugin serves an action label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingEntry {
    pub label: String,
    pub connector: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A background poller plugin and its configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundEntry {
    #[serde(rename = "type")]
    pub plugin_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Top-level runtime configuration, loaded once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub action_execution_mode: ExecutionMode,
    /// Action label -> ordered prerequisite labels.
    #[serde(default)]
    pub action_dependencies: HashMap<String, Vec<String>>,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub agent_actions: Vec<BindingEntry>,
    #[serde(default)]
    pub backgrounds: Vec<BackgroundEntry>,
}

fn default_max_workers() -> usize {
    12
}
fn default_retry_delay_ms() -> u64 {
    100
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            action_execution_mode: ExecutionMode::Concurrent,
            action_dependencies: HashMap::new(),
            max_workers: default_max_workers(),
            retry_delay_ms: default_retry_delay_ms(),
            agent_actions: Vec::new(),
            backgrounds: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Parse, lowercase and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: RuntimeConfig = serde_json::from_str(json)?;
        config.normalize_labels();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Pause applied by worker loops after a failed iteration.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Lowercase binding labels and every dependency edge.
    pub fn normalize_labels(&mut self) {
        for binding in &mut self.agent_actions {
            binding.label = binding.label.trim().to_lowercase();
        }
        self.action_dependencies = self
            .action_dependencies
            .drain()
            .map(|(label, deps)| {
                let deps = deps.into_iter().map(|d| d.to_lowercase()).collect();
                (label.to_lowercase(), deps)
            })
            .collect();
    }

    /// Reject configurations that cannot be run.
    ///
    /// Dependency cycles are not rejected; they only deadlock the actions
    /// involved, so they are reported as a warning.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for binding in &self.agent_actions {
            if binding.label.is_empty() {
                return Err(Error::Config(format!(
                    "action bound to connector '{}' has an empty label",
                    binding.connector
                )));
            }
            if !seen.insert(binding.label.as_str()) {
                return Err(Error::Config(format!(
                    "action label '{}' is bound more than once",
                    binding.label
                )));
            }
        }

        for cycle in self.dependency_cycles() {
            warn!(
                "Dependency cycle between actions [{}]; they will never run in dependencies mode",
                cycle.join(", ")
            );
        }

        Ok(())
    }

    /// Groups of labels that wait on each other, including self-dependencies.
    pub fn dependency_cycles(&self) -> Vec<Vec<String>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (label, deps) in &self.action_dependencies {
            graph.add_node(label.as_str());
            for dep in deps {
                graph.add_edge(dep.as_str(), label.as_str(), ());
            }
        }

        petgraph::algo::tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut labels: Vec<String> = scc.into_iter().map(String::from).collect();
                labels.sort();
                labels
            })
            .collect()
    }
}
