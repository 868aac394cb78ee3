//! Connector capability and the static action → connector registry.
//!
//! A connector is reached two ways at once: `connect` from the dispatch
//! path for each action routed to it, and `tick` from its worker loop.
//! Nothing here serializes the two, so implementations must be safe to
//! call concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, warn};

use actuate_core::{Action, Error, Result};

use crate::error::{ActionError, ConnectorError, StepError};
use crate::signal::StopSignal;
use crate::types::ActionOutcome;
use crate::worker::Step;

/// Pause used by the default [`Connector::tick`].
pub const IDLE_TICK: Duration = Duration::from_millis(50);

/// Builds a connector's typed input from an action's value.
pub type InputSchema<I> = fn(&str) -> std::result::Result<I, String>;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Input: Serialize + Send + 'static;

    fn name(&self) -> &str;

    /// Execute one action.
    async fn connect(&self, input: Self::Input) -> std::result::Result<(), ConnectorError>;

    /// Periodic housekeeping, called repeatedly from the connector's worker loop.
    ///
    /// The default just idles so connectors without a polling side do not spin.
    fn tick(&self) -> std::result::Result<(), ConnectorError> {
        std::thread::sleep(IDLE_TICK);
        Ok(())
    }
}

/// Type-erased view of a binding, so bindings for different connectors
/// can live in one registry.
#[async_trait]
trait Dispatch: Send + Sync {
    fn connector_name(&self) -> &str;

    fn ticker(&self, label: &str) -> Arc<dyn Step>;

    async fn dispatch(&self, label: &str, value: &str) -> std::result::Result<serde_json::Value, ActionError>;
}

struct TypedBinding<C: Connector> {
    connector: Arc<C>,
    schema: InputSchema<C::Input>,
}

#[async_trait]
impl<C: Connector> Dispatch for TypedBinding<C> {
    fn connector_name(&self) -> &str {
        self.connector.name()
    }

    fn ticker(&self, label: &str) -> Arc<dyn Step> {
        Arc::new(ConnectorTicker {
            identity: label.to_string(),
            connector: self.connector.clone(),
        })
    }

    async fn dispatch(&self, label: &str, value: &str) -> std::result::Result<serde_json::Value, ActionError> {
        let input = (self.schema)(value).map_err(|reason| ActionError::InvalidInput {
            label: label.to_string(),
            reason,
        })?;
        let rendered = serde_json::to_value(&input).map_err(|e| ActionError::InvalidInput {
            label: label.to_string(),
            reason: e.to_string(),
        })?;

        self.connector
            .connect(input)
            .await
            .map_err(|source| ActionError::Connector {
                label: label.to_string(),
                source,
            })?;

        Ok(rendered)
    }
}

/// Drives a connector's `tick` from a worker loop.
struct ConnectorTicker<C: Connector> {
    identity: String,
    connector: Arc<C>,
}

impl<C: Connector> Step for ConnectorTicker<C> {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn step(&self, _stop: &StopSignal) -> std::result::Result<(), StepError> {
        self.connector.tick().map_err(StepError::from)
    }
}

/// An action label bound to the connector that executes it.
#[derive(Clone)]
pub struct ActionBinding {
    label: String,
    inner: Arc<dyn Dispatch>,
}

impl ActionBinding {
    /// Bind `label` (lowercased) to `connector`, building its input with `schema`.
    pub fn new<C: Connector>(label: &str, connector: Arc<C>, schema: InputSchema<C::Input>) -> Self {
        Self {
            label: label.trim().to_lowercase(),
            inner: Arc::new(TypedBinding { connector, schema }),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn connector_name(&self) -> &str {
        self.inner.connector_name()
    }

    /// The worker-loop side of this binding's connector.
    pub fn ticker(&self) -> Arc<dyn Step> {
        self.inner.ticker(&self.label)
    }

    /// Build the connector input from `action.value` and execute it.
    pub async fn call(&self, action: &Action) -> std::result::Result<ActionOutcome, ActionError> {
        debug!(
            "Calling action {} with type {} and argument {}",
            self.label,
            action.label(),
            action.value
        );
        let started = Instant::now();
        match self.inner.dispatch(&self.label, &action.value).await {
            Ok(input) => Ok(ActionOutcome {
                label: self.label.clone(),
                value: action.value.clone(),
                input,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
            Err(e) => {
                error!(label = %self.label, "Action failed: {}", e);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ActionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionBinding")
            .field("label", &self.label)
            .field("connector", &self.connector_name())
            .finish()
    }
}

/// Static, pre-indexed set of bindings. Built once at configuration load.
#[derive(Debug, Default, Clone)]
pub struct ActionRegistry {
    bindings: HashMap<String, ActionBinding>,
    order: Vec<String>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding. Empty and duplicate labels are configuration errors.
    pub fn register(&mut self, binding: ActionBinding) -> Result<()> {
        if binding.label.is_empty() {
            return Err(Error::Config(format!(
                "connector '{}' bound to an empty action label",
                binding.connector_name()
            )));
        }
        if self.bindings.contains_key(&binding.label) {
            return Err(Error::Config(format!(
                "action label '{}' is already bound",
                binding.label
            )));
        }
        self.order.push(binding.label.clone());
        self.bindings.insert(binding.label.clone(), binding);
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&ActionBinding> {
        self.bindings.get(&label.to_lowercase())
    }

    /// Look up the binding for a (normalized) action, warning when there is none.
    pub fn resolve(&self, action: &Action) -> Option<&ActionBinding> {
        let label = action.label();
        let binding = self.bindings.get(&label);
        if binding.is_none() {
            warn!("Attempted to call non-existent action: {}.", label);
        }
        binding
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionBinding> {
        self.order.iter().filter_map(|label| self.bindings.get(label))
    }
}
