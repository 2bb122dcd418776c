//! Run dispatcher
//!
//! Bounded queue between the trigger path and the orchestrator. A worker
//! loop pulls runs off the queue and executes each in its own task, with at
//! most `max_concurrent_runs` executing at once.

use std::sync::Arc;
use std::time::Duration;

use conveyor_core::dto::run::RunOutcome;
use tokio::sync::{Semaphore, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::service::orchestrator::{Orchestrator, OrchestratorError};

/// A run waiting to be executed
#[derive(Debug, Clone)]
pub struct RunJob {
    pub run_id: Uuid,
    pub source_reference: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("run queue is full")]
    QueueFull,

    #[error("run queue is closed")]
    Closed,
}

/// Exponential backoff for retryable start failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Sending half of the run queue
#[derive(Clone)]
pub struct RunDispatcher {
    sender: mpsc::Sender<RunJob>,
}

/// Receiving half of the run queue, driven by `run`
pub struct RunQueue {
    receiver: mpsc::Receiver<RunJob>,
}

impl RunDispatcher {
    pub fn channel(capacity: usize) -> (Self, RunQueue) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, RunQueue { receiver })
    }

    /// Enqueue a run without waiting for room
    pub fn dispatch(&self, job: RunJob) -> Result<(), DispatchError> {
        let run_id = job.run_id;
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })?;
        info!("Run {} queued", run_id);
        Ok(())
    }
}

impl RunQueue {
    /// Execute queued runs until every dispatcher is dropped
    pub async fn run(
        mut self,
        orchestrator: Arc<Orchestrator>,
        max_concurrent_runs: usize,
        retry: RetryPolicy,
    ) {
        info!(
            "Starting run queue worker (max concurrent runs: {})",
            max_concurrent_runs
        );
        let semaphore = Arc::new(Semaphore::new(max_concurrent_runs));

        while let Some(job) = self.receiver.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                error!("Run semaphore closed, stopping worker");
                break;
            };

            let orchestrator = Arc::clone(&orchestrator);
            let retry = retry.clone();
            tokio::spawn(async move {
                let run_id = job.run_id;
                match execute_with_retry(&orchestrator, &job, &retry).await {
                    Ok(outcome) => info!("Run {}: {}", run_id, outcome.message),
                    Err(e) => error!("Run {} could not be executed: {}", run_id, e),
                }
                // Permit is released when dropped
                drop(permit);
            });
        }

        info!("Run queue closed");
    }

    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<RunJob> {
        self.receiver.try_recv().ok()
    }
}

/// Execute a run, retrying start failures with exponential backoff
pub async fn execute_with_retry(
    orchestrator: &Orchestrator,
    job: &RunJob,
    retry: &RetryPolicy,
) -> Result<RunOutcome, OrchestratorError> {
    let mut attempt = 0;
    let mut delay = retry.initial_delay;

    loop {
        attempt += 1;

        match orchestrator
            .execute_run(job.run_id, &job.source_reference)
            .await
        {
            Ok(outcome) => {
                if attempt > 1 {
                    info!(
                        "Run {} started after {} attempt(s)",
                        job.run_id, attempt
                    );
                }
                return Ok(outcome);
            }
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                warn!(
                    "Failed to start run {} (attempt {}/{}): {}",
                    job.run_id, attempt, retry.max_attempts, e
                );
                warn!("Retrying in {} ms...", delay.as_millis());

                tokio::time::sleep(delay).await;

                // Exponential backoff with cap
                delay = (delay * 2).min(retry.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}
