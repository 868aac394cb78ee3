//! Shared stop signal handed to every worker loop and every step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// One-way stop flag. Once signaled it stays signaled.
///
/// Clones share state, so an orchestrator keeps one and gives a clone to
/// each loop it launches.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    flag: AtomicBool,
    lock: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every holder to stop and wake anyone paused in [`wait_timeout`](Self::wait_timeout).
    pub fn signal(&self) {
        let mut stopped = self.inner.lock.lock();
        *stopped = true;
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.cvar.notify_all();
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Sleep for up to `timeout`, returning early if the signal fires.
    ///
    /// Returns whether the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.inner.lock.lock();
        while !*stopped {
            if self.inner.cvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}
