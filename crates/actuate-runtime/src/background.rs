//! Background orchestrator: keeps state pollers running off the dispatch path.
//!
//! Each background runs in its own worker loop on a bounded thread pool.
//! A background that errors or panics is logged and restarted after the
//! retry delay; it never takes its siblings or the process down.

use std::sync::Arc;

use tracing::info;

use actuate_core::{Result, RuntimeConfig};

use crate::error::StepError;
use crate::signal::StopSignal;
use crate::supervisor::Supervisor;
use crate::types::LoopReport;
use crate::worker::Step;

/// A long-lived poller feeding sensor or state data into shared stores.
pub trait Background: Send + Sync + 'static {
    /// Unique name; a second background with the same name is not started.
    fn name(&self) -> &str;

    /// One polling pass. Called again as soon as it returns.
    fn run(&self, stop: &StopSignal) -> std::result::Result<(), StepError>;
}

struct BackgroundRunner {
    background: Arc<dyn Background>,
}

impl Step for BackgroundRunner {
    fn identity(&self) -> &str {
        self.background.name()
    }

    fn step(&self, stop: &StopSignal) -> std::result::Result<(), StepError> {
        self.background.run(stop)
    }
}

pub struct BackgroundOrchestrator {
    backgrounds: Vec<Arc<dyn Background>>,
    supervisor: Supervisor,
}

impl BackgroundOrchestrator {
    pub fn new(config: &RuntimeConfig, backgrounds: Vec<Arc<dyn Background>>) -> Result<Self> {
        let supervisor = Supervisor::new(
            "Background",
            "background-orchestrator-",
            backgrounds.len(),
            config.max_workers,
            config.retry_delay(),
        )?;

        info!(
            "BackgroundOrchestrator initialized: {} backgrounds, {} workers",
            backgrounds.len(),
            supervisor.worker_count()
        );

        Ok(Self {
            backgrounds,
            supervisor,
        })
    }

    /// Start a loop for every background not yet submitted.
    pub fn start(&mut self) -> usize {
        let runners = self.backgrounds.iter().map(|background| {
            Arc::new(BackgroundRunner {
                background: background.clone(),
            }) as Arc<dyn Step>
        });
        self.supervisor.start(runners.collect::<Vec<_>>())
    }

    /// Signal every loop to stop and wait for all of them to exit.
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

    pub fn statuses(&self) -> Vec<LoopReport> {
        self.supervisor.statuses()
    }
}
