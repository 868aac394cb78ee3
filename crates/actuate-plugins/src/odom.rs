//! Odometry background: polls an odometry source and publishes the latest pose.
//!
//! Position, orientation and motion state feed localization and navigation
//! elsewhere in the runtime. The source is either a pub/sub subscription
//! keyed by the robot's URID or a direct ethernet link to the base; both
//! transports are provided outside this crate through [`OdomSource`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use actuate_runtime::{Background, StepError, StopSignal};

use crate::motion::MotionState;

/// Odometry background configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdomConfig {
    /// Subscribe over pub/sub instead of the ethernet link.
    #[serde(default)]
    pub use_zenoh: bool,
    /// Unique robot ID, used to scope pub/sub topics.
    #[serde(default, rename = "URID")]
    pub urid: String,
    /// Ethernet channel of the robot base.
    #[serde(default)]
    pub unitree_ethernet: Option<String>,
    /// Pause between polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    50
}

impl OdomConfig {
    /// Whether a hardware or pub/sub transport is requested.
    pub fn wants_transport(&self) -> bool {
        self.use_zenoh || self.unitree_ethernet.is_some()
    }
}

/// One odometry sample.
#[derive(Debug, Clone, Serialize)]
pub struct OdomReading {
    pub x: f64,
    pub y: f64,
    /// Heading in radians, counter-clockwise.
    pub yaw: f64,
    pub moving: bool,
    pub timestamp: DateTime<Utc>,
}

/// Where odometry comes from.
pub trait OdomSource: Send + Sync {
    /// Block up to `timeout` for the next sample. `Ok(None)` means nothing arrived.
    fn read(&self, timeout: Duration) -> Result<Option<OdomReading>, String>;
}

/// Latest published odometry, shared with the rest of the runtime.
#[derive(Debug, Default)]
pub struct OdomStore {
    latest: RwLock<Option<OdomReading>>,
    updates: AtomicU64,
}

impl OdomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, reading: OdomReading) {
        *self.latest.write() = Some(reading);
        self.updates.fetch_add(1, Ordering::SeqCst);
    }

    pub fn latest(&self) -> Option<OdomReading> {
        self.latest.read().clone()
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }
}

pub struct Odom {
    source: Arc<dyn OdomSource>,
    store: Arc<OdomStore>,
    poll_interval: Duration,
}

impl Odom {
    pub fn new(config: &OdomConfig, source: Arc<dyn OdomSource>, store: Arc<OdomStore>) -> Self {
        if config.use_zenoh {
            if config.urid.is_empty() {
                warn!("Odom using Zenoh without a URID; topics will not be robot-scoped");
            }
            info!("Odom using Zenoh with URID: {} in background", config.urid);
        } else if let Some(channel) = &config.unitree_ethernet {
            info!("Odom using ethernet channel {} in background", channel);
        } else {
            info!("Odom provider initialized without Zenoh in Odom background");
        }

        Self {
            source,
            store,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl Background for Odom {
    fn name(&self) -> &str {
        "odom"
    }

    fn run(&self, stop: &StopSignal) -> Result<(), StepError> {
        if let Some(reading) = self.source.read(self.poll_interval).map_err(StepError::Failed)? {
            self.store.publish(reading);
        }
        stop.wait_timeout(self.poll_interval);
        Ok(())
    }
}

/// Linear speed used by the simulation, in m/s.
const SIM_LINEAR_SPEED: f64 = 0.5;
/// Angular speed used by the simulation, in rad/s.
const SIM_ANGULAR_SPEED: f64 = std::f64::consts::FRAC_PI_4;

#[derive(Debug, Default, Clone, Copy)]
struct Pose {
    x: f64,
    y: f64,
    yaw: f64,
}

/// Integrates the commanded motion into a pose, for running without hardware.
pub struct SimulatedOdomSource {
    motion: Arc<MotionState>,
    pose: Mutex<(Pose, Instant)>,
}

impl SimulatedOdomSource {
    pub fn new(motion: Arc<MotionState>) -> Self {
        Self {
            motion,
            pose: Mutex::new((Pose::default(), Instant::now())),
        }
    }
}

impl OdomSource for SimulatedOdomSource {
    fn read(&self, _timeout: Duration) -> Result<Option<OdomReading>, String> {
        let command = self.motion.current();
        let mut guard = self.pose.lock();
        let (pose, last) = &mut *guard;
        let dt = last.elapsed().as_secs_f64();
        *last = Instant::now();

        let moving = match command.action.as_str() {
            "move forwards" => {
                pose.x += SIM_LINEAR_SPEED * pose.yaw.cos() * dt;
                pose.y += SIM_LINEAR_SPEED * pose.yaw.sin() * dt;
                true
            }
            "move back" => {
                pose.x -= SIM_LINEAR_SPEED * pose.yaw.cos() * dt;
                pose.y -= SIM_LINEAR_SPEED * pose.yaw.sin() * dt;
                true
            }
            "turn left" => {
                pose.yaw += SIM_ANGULAR_SPEED * dt;
                true
            }
            "turn right" => {
                pose.yaw -= SIM_ANGULAR_SPEED * dt;
                true
            }
            _ => false,
        };

        Ok(Some(OdomReading {
            x: pose.x,
            y: pose.y,
            yaw: pose.yaw,
            moving,
            timestamp: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl OdomSource for Broken {
        fn read(&self, _timeout: Duration) -> Result<Option<OdomReading>, String> {
            Err("no carrier".into())
        }
    }

    fn config() -> OdomConfig {
        OdomConfig {
            poll_interval_ms: 1,
            ..OdomConfig::default()
        }
    }

    #[test]
    fn test_config_field_names() {
        let config: OdomConfig = serde_json::from_value(serde_json::json!({
            "use_zenoh": true,
            "URID": "robot-7"
        }))
        .unwrap();
        assert!(config.use_zenoh);
        assert_eq!(config.urid, "robot-7");
        assert!(config.unitree_ethernet.is_none());
        assert_eq!(config.poll_interval_ms, 50);
        assert!(config.wants_transport());
        assert!(!OdomConfig::default().wants_transport());
    }

    #[test]
    fn test_run_publishes_reading() {
        let motion = Arc::new(MotionState::new());
        let store = Arc::new(OdomStore::new());
        let odom = Odom::new(
            &config(),
            Arc::new(SimulatedOdomSource::new(motion)),
            store.clone(),
        );

        odom.run(&StopSignal::new()).unwrap();
        let reading = store.latest().unwrap();
        assert!(!reading.moving);
        assert_eq!(store.updates(), 1);
    }

    #[test]
    fn test_source_error_fails_iteration() {
        let store = Arc::new(OdomStore::new());
        let odom = Odom::new(&config(), Arc::new(Broken), store.clone());

        let err = odom.run(&StopSignal::new()).unwrap_err();
        assert_eq!(err, StepError::Failed("no carrier".into()));
        assert!(store.latest().is_none());
    }

    #[test]
    fn test_simulation_follows_commands() {
        let motion = Arc::new(MotionState::new());
        let source = SimulatedOdomSource::new(motion.clone());

        motion.set("move forwards");
        source.read(Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let forward = source.read(Duration::ZERO).unwrap().unwrap();
        assert!(forward.moving);
        assert!(forward.x > 0.0);

        motion.set("turn left");
        std::thread::sleep(Duration::from_millis(20));
        let turned = source.read(Duration::ZERO).unwrap().unwrap();
        assert!(turned.yaw > 0.0);
    }
}
