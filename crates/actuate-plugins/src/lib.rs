//! Connectors and background pollers: motion, speech, odometry.
//!
//! Concrete transports (pub/sub, robot ethernet) live outside this crate;
//! odometry reads go through the [`OdomSource`] trait, with a simulated
//! source that integrates the last commanded motion.

pub mod loader;
pub mod motion;
pub mod odom;
pub mod speech;

pub use loader::{load_actions, load_backgrounds, PluginContext};
pub use motion::{MoveConnector, MoveInput, MotionState};
pub use odom::{Odom, OdomConfig, OdomReading, OdomSource, OdomStore, SimulatedOdomSource};
pub use speech::{SpeakConnector, SpeakInput, UtteranceLog};
