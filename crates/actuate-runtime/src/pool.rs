//! Fixed-size pool of named OS threads.
//!
//! Jobs are taken in submission order. A job that never returns keeps its
//! thread forever, so with more long-lived jobs than threads the excess
//! wait in the queue until a thread frees up.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, error};

use actuate_core::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Dedicated threads rather than `tokio::task::spawn_blocking`: worker
/// loops live until shutdown, so on the blocking pool they would hold its
/// threads indefinitely with no cap tied to `max_workers`, and `stop()`
/// could not join them. Here the thread count is fixed, threads carry the
/// orchestrator's name prefix, and `shutdown()` joins every one of them.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
    name_prefix: String,
}

impl WorkerPool {
    /// Spawn `size` threads named `{name_prefix}{index}`. `size` is clamped to at least 1.
    pub fn new(size: usize, name_prefix: &str) -> Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut threads = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}{}", name_prefix, index))
                .spawn(move || loop {
                    let job = receiver.lock().recv();
                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                })?;
            threads.push(handle);
        }

        debug!("Worker pool '{}' started with {} threads", name_prefix, size);

        Ok(Self {
            sender: Some(sender),
            threads,
            name_prefix: name_prefix.to_string(),
        })
    }

    pub fn size(&self) -> usize {
        self.threads.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.is_none()
    }

    /// Queue a job. Fails once the pool has been shut down.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or_else(|| {
            Error::Internal(format!("worker pool '{}' is shut down", self.name_prefix))
        })?;
        sender
            .send(Box::new(job))
            .map_err(|_| Error::Internal(format!("worker pool '{}' has no threads", self.name_prefix)))
    }

    /// Stop accepting jobs, let queued jobs run, and join every thread.
    pub fn shutdown(&mut self) {
        drop(self.sender.take());
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("Pool thread {} panicked", name);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
