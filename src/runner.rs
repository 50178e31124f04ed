use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::hooks::{self, HookContext};
use crate::job::JobContext;
use crate::meta_store::MetaStore;
use crate::queue::{Broker, Envelope};


/// What a single poll of the queue did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// The queue was empty.
    Idle,
    /// A job ran, successfully or not.
    Performed,
    /// The job type is not registered here; it went back on the queue.
    Requeued,
    /// The payload could not be read; it went to the dead-job list.
    Buried,
}

/// Pops jobs off one queue and runs them between the lifecycle hooks.
#[derive(Clone)]
pub struct Worker {
    store: MetaStore,
    broker: Arc<dyn Broker>,
    queue: String,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(store: MetaStore, broker: Arc<dyn Broker>, queue: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            store,
            broker,
            queue: queue.into(),
            poll_interval,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Processes at most one job. Payloads this worker cannot run are never
    /// dropped: unknown job types are pushed back, unreadable ones buried.
    pub async fn work_once(&self) -> Result<WorkOutcome> {
        let Some(payload) = self.broker.pop(&self.queue).await? else {
            return Ok(WorkOutcome::Idle);
        };

        let envelope: Envelope = match serde_json::from_str(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(queue = %self.queue, error = %e, "Burying unreadable job payload");
                self.broker.bury(payload).await?;
                return Ok(WorkOutcome::Buried);
            }
        };

        let Some(registration) = self.store.registry().get(&envelope.job_type) else {
            warn!(job_id = %envelope.job_id, job_type = %envelope.job_type, "No handler registered, requeueing");
            self.broker.push(&self.queue, payload).await?;
            return Ok(WorkOutcome::Requeued);
        };

        let ctx = HookContext {
            store: &self.store,
            job_type: &registration.job_type,
            job_id: &envelope.job_id,
            args: &envelope.args,
        };

        debug!(job_id = %envelope.job_id, job_type = %envelope.job_type, "Processing job");
        hooks::run_before_perform(&registration.hooks, &ctx).await;

        let job_ctx = JobContext::new(envelope.job_id.clone(), registration.job_type, self.store.clone());
        let fut = (registration.handler)(job_ctx, envelope.args.clone());
        let outcome = tokio::spawn(fut).await.unwrap_or_else(|e| Err(join_to_error(e)));

        match outcome {
            Ok(()) => {
                info!(job_id = %envelope.job_id, job_type = %envelope.job_type, "Job succeeded");
                hooks::run_after_perform(&registration.hooks, &ctx).await;
            }
            Err(err) => {
                warn!(job_id = %envelope.job_id, job_type = %envelope.job_type, error = %err, "Job failed");
                hooks::run_on_failure(&registration.hooks, &err, &ctx).await;
            }
        }

        Ok(WorkOutcome::Performed)
    }

    /// Runs jobs until the queue is empty or holds only jobs this worker
    /// cannot run. Returns how many were performed.
    pub async fn work(&self) -> Result<usize> {
        let mut processed = 0;
        let mut requeued = 0;
        loop {
            match self.work_once().await? {
                WorkOutcome::Idle => break,
                WorkOutcome::Performed => {
                    processed += 1;
                    requeued = 0;
                }
                WorkOutcome::Buried => requeued = 0,
                WorkOutcome::Requeued => {
                    requeued += 1;
                    // Every remaining job has been seen and skipped.
                    if requeued >= self.broker.len(&self.queue).await? {
                        break;
                    }
                }
            }
        }
        Ok(processed)
    }

    /// Polls forever, sleeping between empty polls.
    pub async fn run(self) {
        info!(queue = %self.queue, "Worker started");
        loop {
            match self.work_once().await {
                Ok(WorkOutcome::Performed | WorkOutcome::Buried) => {}
                Ok(WorkOutcome::Idle | WorkOutcome::Requeued) => sleep(self.poll_interval).await,
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Failed to fetch next job");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }
}

fn join_to_error(e: JoinError) -> anyhow::Error {
    if e.is_panic() {
        anyhow::anyhow!("Job handler panicked")
    } else {
        anyhow::anyhow!("Job handler cancelled")
    }
}


pub fn start_worker_pool(worker: Worker, concurrency: usize) {
    for _ in 0..concurrency {
        tokio::spawn(worker.clone().run());
    }
}
