//! Move connector: accepts movement commands and holds them for a while.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use actuate_core::action::SHORTHAND_LABELS;
use actuate_runtime::{Connector, ConnectorError};

/// Pause between ticks of the move connector's worker loop.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

const STAND_STILL: &str = "stand still";

/// Input expected by [`MoveConnector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveInput {
    pub action: String,
}

/// Input schema for movement actions. Only the known movement commands are accepted.
pub fn move_input(value: &str) -> Result<MoveInput, String> {
    let action = value.trim().to_lowercase();
    if !SHORTHAND_LABELS.contains(&action.as_str()) {
        return Err(format!("unknown movement '{}'", value));
    }
    Ok(MoveInput { action })
}

/// Connector settings read from a binding's `config` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveConfig {
    /// How long a command is held before falling back to "stand still".
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
}

fn default_hold_ms() -> u64 {
    1500
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            hold_ms: default_hold_ms(),
        }
    }
}

/// The motion currently commanded.
#[derive(Debug, Clone, Serialize)]
pub struct MotionCommand {
    pub action: String,
    pub issued_at: DateTime<Utc>,
}

/// Latest commanded motion, shared with whatever drives the body (or simulates it).
#[derive(Debug)]
pub struct MotionState {
    command: RwLock<MotionCommand>,
}

impl MotionState {
    pub fn new() -> Self {
        Self {
            command: RwLock::new(MotionCommand {
                action: STAND_STILL.to_string(),
                issued_at: Utc::now(),
            }),
        }
    }

    pub fn current(&self) -> MotionCommand {
        self.command.read().clone()
    }

    pub fn set(&self, action: &str) {
        *self.command.write() = MotionCommand {
            action: action.to_string(),
            issued_at: Utc::now(),
        };
    }

    /// Revert to "stand still" if the current command is older than `hold`.
    /// Returns whether it did.
    pub fn expire(&self, hold: Duration) -> bool {
        let mut command = self.command.write();
        if command.action == STAND_STILL {
            return false;
        }
        let age = Utc::now()
            .signed_duration_since(command.issued_at)
            .to_std()
            .unwrap_or_default();
        if age < hold {
            return false;
        }
        command.action = STAND_STILL.to_string();
        command.issued_at = Utc::now();
        true
    }
}

impl Default for MotionState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MoveConnector {
    state: Arc<MotionState>,
    hold: Duration,
}

impl MoveConnector {
    pub fn new(state: Arc<MotionState>, config: MoveConfig) -> Self {
        Self {
            state,
            hold: Duration::from_millis(config.hold_ms),
        }
    }
}

#[async_trait]
impl Connector for MoveConnector {
    type Input = MoveInput;

    fn name(&self) -> &str {
        "move"
    }

    async fn connect(&self, input: MoveInput) -> Result<(), ConnectorError> {
        info!("Move command: {}", input.action);
        self.state.set(&input.action);
        Ok(())
    }

    fn tick(&self) -> Result<(), ConnectorError> {
        if self.state.expire(self.hold) {
            debug!("Move command expired after {:?}, standing still", self.hold);
        }
        std::thread::sleep(TICK_INTERVAL);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_input_accepts_known_commands() {
        assert_eq!(
            move_input(" Turn Left ").unwrap(),
            MoveInput {
                action: "turn left".into()
            }
        );
        assert!(move_input("moonwalk").is_err());
        assert!(move_input("").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config: MoveConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.hold_ms, 1500);
    }

    #[tokio::test]
    async fn test_connect_sets_command() {
        let state = Arc::new(MotionState::new());
        let connector = MoveConnector::new(state.clone(), MoveConfig::default());
        connector
            .connect(MoveInput {
                action: "move forwards".into(),
            })
            .await
            .unwrap();
        assert_eq!(state.current().action, "move forwards");
    }

    #[test]
    fn test_tick_expires_old_command() {
        let state = Arc::new(MotionState::new());
        let connector = MoveConnector::new(state.clone(), MoveConfig { hold_ms: 0 });

        state.set("turn right");
        connector.tick().unwrap();
        assert_eq!(state.current().action, "stand still");
        assert!(!state.expire(Duration::ZERO));
    }

    #[test]
    fn test_fresh_command_is_held() {
        let state = MotionState::new();
        state.set("move back");
        assert!(!state.expire(Duration::from_secs(60)));
        assert_eq!(state.current().action, "move back");
    }
}
