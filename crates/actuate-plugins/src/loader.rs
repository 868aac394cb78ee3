//! Build connectors and backgrounds from the runtime configuration.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::info;

use actuate_core::{Error, Result, RuntimeConfig};
use actuate_runtime::{ActionBinding, ActionRegistry, Background};

use crate::motion::{move_input, MotionState, MoveConfig, MoveConnector};
use crate::odom::{Odom, OdomConfig, OdomSource, OdomStore, SimulatedOdomSource};
use crate::speech::{speak_input, SpeakConnector, UtteranceLog};

/// State shared between plugins and with the host.
#[derive(Clone, Default)]
pub struct PluginContext {
    pub motion: Arc<MotionState>,
    pub odom_store: Arc<OdomStore>,
    pub utterances: Arc<UtteranceLog>,
    /// Odometry transport supplied by the host, if any.
    pub odom_source: Option<Arc<dyn OdomSource>>,
}

impl PluginContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_odom_source(mut self, source: Arc<dyn OdomSource>) -> Self {
        self.odom_source = Some(source);
        self
    }

    fn odom_source(&self, config: &OdomConfig) -> Result<Arc<dyn OdomSource>> {
        if let Some(source) = &self.odom_source {
            return Ok(source.clone());
        }
        if config.wants_transport() {
            return Err(Error::Config(
                "odom requests a Zenoh or ethernet transport but none was provided".into(),
            ));
        }
        Ok(Arc::new(SimulatedOdomSource::new(self.motion.clone())))
    }
}

fn plugin_config<T: DeserializeOwned + Default>(name: &str, raw: &serde_json::Value) -> Result<T> {
    if raw.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(raw.clone())
        .map_err(|e| Error::Config(format!("invalid config for '{}': {}", name, e)))
}

/// Register one binding per `agent_actions` entry.
pub fn load_actions(config: &RuntimeConfig, ctx: &PluginContext) -> Result<ActionRegistry> {
    let mut registry = ActionRegistry::new();
    for entry in &config.agent_actions {
        let binding = match entry.connector.as_str() {
            "move" => {
                let move_config: MoveConfig = plugin_config(&entry.connector, &entry.config)?;
                let connector = Arc::new(MoveConnector::new(ctx.motion.clone(), move_config));
                ActionBinding::new(&entry.label, connector, move_input)
            }
            "speak" => {
                let connector = Arc::new(SpeakConnector::new(ctx.utterances.clone()));
                ActionBinding::new(&entry.label, connector, speak_input)
            }
            other => {
                return Err(Error::Config(format!(
                    "unknown connector '{}' for action '{}'",
                    other, entry.label
                )))
            }
        };
        registry.register(binding)?;
    }

    info!("Loaded {} action bindings", registry.len());
    Ok(registry)
}

/// Instantiate every configured background poller.
pub fn load_backgrounds(config: &RuntimeConfig, ctx: &PluginContext) -> Result<Vec<Arc<dyn Background>>> {
    let mut backgrounds: Vec<Arc<dyn Background>> = Vec::new();
    for entry in &config.backgrounds {
        match entry.plugin_type.as_str() {
            "odom" => {
                let odom_config: OdomConfig = plugin_config(&entry.plugin_type, &entry.config)?;
                let source = ctx.odom_source(&odom_config)?;
                backgrounds.push(Arc::new(Odom::new(&odom_config, source, ctx.odom_store.clone())));
            }
            other => {
                return Err(Error::Config(format!("unknown background '{}'", other)));
            }
        }
    }

    info!("Loaded {} backgrounds", backgrounds.len());
    Ok(backgrounds)
}
