//! Process-wide worker pool.
//!
//! Background batches are submitted as async tasks and tracked until they
//! finish. CPU-bound model work runs on the blocking pool, but only while
//! holding one of `size` permits, which bounds how many variants train at
//! once. Permits are handed out FIFO, so variants start in submission order.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    accepting: AtomicBool,
    active_tasks: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    runtime: Handle,
}

struct TaskGuard {
    active_tasks: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.active_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

impl WorkerPool {
    /// Must be called from inside a tokio runtime.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("worker pool needs at least one worker".into()));
        }
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("worker pool requires a tokio runtime: {}", e)))?;
        info!(workers = size, "worker pool started");
        Ok(Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            accepting: AtomicBool::new(true),
            active_tasks: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
            runtime,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Schedules new top-level work. Refused once shutdown has begun.
    pub fn submit<F>(&self, future: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.is_accepting() {
            return Err(Error::Shutdown);
        }
        Ok(self.spawn(future))
    }

    /// Schedules work that belongs to an already running task. Allowed
    /// during shutdown so in-flight batches can finish.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        let guard = TaskGuard {
            active_tasks: self.active_tasks.clone(),
            drained: self.drained.clone(),
        };
        self.runtime.spawn(async move {
            let _guard = guard;
            future.await
        })
    }

    /// Runs CPU-bound `work` on the blocking pool under a worker permit.
    pub async fn compute<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Shutdown)?;
        self.runtime
            .spawn_blocking(move || {
                let _permit = permit;
                work()
            })
            .await
            .map_err(|e| Error::Engine(format!("worker panicked: {}", e)))?
    }

    /// Refuses further `submit` calls. Already tracked work keeps running.
    pub fn close(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            info!(active = self.active_tasks(), "worker pool draining");
        }
    }

    /// Stops accepting new batches and waits for tracked tasks to drain.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.close();

        let drain = async {
            loop {
                let notified = self.drained.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.active_tasks() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => {
                info!("worker pool drained");
                Ok(())
            }
            Err(_) => {
                warn!(active = self.active_tasks(), "worker pool drain timed out");
                Err(Error::Timeout(format!(
                    "{} tasks still running after {:?}",
                    self.active_tasks(),
                    timeout
                )))
            }
        }
    }
}
