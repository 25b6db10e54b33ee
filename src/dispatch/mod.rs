//! # Operation Dispatch
//!
//! Runs one operation at a time, either inline on the caller's thread or
//! on a single dedicated cooperative worker that the caller joins
//! synchronously. The worker exists to measure dispatch overhead against
//! inline execution; for the same inputs the two modes produce identical
//! results.
//!
//! ## Worker Model
//!
//! One OS thread, created once per engine and joined once at teardown,
//! fed through a rendezvous channel of capacity one: one producer, one
//! consumer, at most one task in flight, no queueing beyond the single
//! slot. On Linux the worker pins itself to the next CPU after the one
//! it starts on; a pin failure is logged and ignored, matching the
//! affinity-is-best-effort behavior of the environment this models.
//!
//! A task's own failure is that operation's result. Failure to hand the
//! task over or to get it back ([`crate::EpodbError::DispatchFailure`])
//! means the worker is gone and the run is broken.

use std::sync::mpsc::{self, SyncSender};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::error::EpodbError;

/// Execution mode, fixed for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Operations run on the calling thread.
    Inline,
    /// Operations run on the dedicated worker; the caller blocks until
    /// the task completes.
    Worker,
}

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct DispatchExecutor {
    worker: Option<Worker>,
}

struct Worker {
    tx: Option<SyncSender<Task>>,
    handle: Option<JoinHandle<()>>,
}

impl DispatchExecutor {
    pub fn new(mode: ExecMode) -> Result<Self, EpodbError> {
        match mode {
            ExecMode::Inline => Ok(Self { worker: None }),
            ExecMode::Worker => {
                let (tx, rx) = mpsc::sync_channel::<Task>(1);
                let handle = std::thread::Builder::new()
                    .name("epodb-worker".into())
                    .spawn(move || {
                        pin_to_next_cpu();
                        while let Ok(task) = rx.recv() {
                            task();
                        }
                    })
                    .map_err(|e| {
                        EpodbError::DispatchFailure(format!("failed to spawn worker: {e}"))
                    })?;
                debug!("cooperative worker started");
                Ok(Self {
                    worker: Some(Worker {
                        tx: Some(tx),
                        handle: Some(handle),
                    }),
                })
            }
        }
    }

    pub fn mode(&self) -> ExecMode {
        if self.worker.is_some() {
            ExecMode::Worker
        } else {
            ExecMode::Inline
        }
    }

    /// Run `task` under the configured mode and hand back its result.
    pub fn submit_and_join<T, F>(&self, task: F) -> Result<T, EpodbError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let Some(worker) = &self.worker else {
            return Ok(task());
        };

        let tx = worker
            .tx
            .as_ref()
            .expect("worker sender lives until teardown");
        let (result_tx, result_rx) = mpsc::sync_channel::<T>(1);
        tx.send(Box::new(move || {
            let _ = result_tx.send(task());
        }))
        .map_err(|_| EpodbError::DispatchFailure("worker task slot closed".into()))?;

        result_rx
            .recv()
            .map_err(|_| EpodbError::DispatchFailure("worker exited before completing task".into()))
    }
}

impl Drop for DispatchExecutor {
    fn drop(&mut self) {
        if let Some(worker) = &mut self.worker {
            worker.tx.take();
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!("cooperative worker panicked during teardown");
                }
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn pin_to_next_cpu() {
    // SAFETY: plain libc affinity calls on the current thread; the
    // cpu_set_t is zero-initialized and only touched through CPU_ZERO /
    // CPU_SET before being handed to sched_setaffinity.
    unsafe {
        let current = libc::sched_getcpu();
        let cpus = libc::sysconf(libc::_SC_NPROCESSORS_ONLN);
        if current < 0 || cpus <= 0 {
            warn!("cpu topology unavailable; worker runs unpinned");
            return;
        }
        let target = ((current as i64 + 1) % cpus) as usize;
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(target, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            warn!(cpu = target, "failed to pin worker; continuing without affinity");
        } else {
            debug!(cpu = target, "worker pinned");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_next_cpu() {
    debug!("cpu pinning not supported on this platform; worker runs unpinned");
}
