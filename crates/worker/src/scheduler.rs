//! Supervised periodic tasks
//!
//! Every registered task gets one loop per worker. A loop runs the task in
//! its own spawned future so a panic is contained: the loop logs it, waits
//! the backoff and runs the task again. Errors are logged and the loop
//! waits the regular interval.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use patos_shared::AuthResult;
use tokio::{sync::watch, task::JoinHandle};

#[async_trait]
pub trait Task: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One pass. Returns how many rows it touched.
    async fn run(&self) -> AuthResult<u64>;
}

pub struct Scheduler {
    backoff: Duration,
    shutdown: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(backoff: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            backoff,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Start `workers` loops running `task` every `interval`, first run immediately.
    pub fn register(&mut self, task: Arc<dyn Task>, interval: Duration, workers: usize) {
        for worker in 0..workers {
            tracing::info!(task = task.name(), worker, interval_secs = interval.as_secs(), "Task registered");
            self.handles.push(tokio::spawn(supervise(
                task.clone(),
                interval,
                self.backoff,
                self.shutdown.clone(),
            )));
        }
    }

    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every loop to stop. Loops stop once shutdown is signalled.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Task loop ended abnormally");
            }
        }
    }
}

async fn supervise(
    task: Arc<dyn Task>,
    interval: Duration,
    backoff: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = task.name();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let run = {
            let task = task.clone();
            tokio::spawn(async move { task.run().await })
        };

        let wait = match run.await {
            Ok(Ok(count)) => {
                tracing::info!(task = name, count, "Task finished");
                interval
            }
            Ok(Err(e)) => {
                tracing::error!(task = name, error = %e, "Task failed");
                interval
            }
            Err(e) => {
                tracing::error!(
                    task = name,
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "Task crashed, restarting after backoff"
                );
                backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                // A dropped sender also means stop
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(task = name, "Task loop stopped");
}
