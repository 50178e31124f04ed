// src/registry.rs
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::hooks::LifecycleHook;
use crate::job::{Job, JobContext, JobType};

pub type HandlerFn = fn(JobContext, Value) -> BoxFuture<'static, anyhow::Result<()>>;

/// Everything a worker needs to run one job type.
#[derive(Clone)]
pub struct Registration {
    pub job_type: JobType,
    pub handler: HandlerFn,
    pub hooks: Vec<Arc<dyn LifecycleHook>>,
}

fn perform_job<J>(ctx: JobContext, args: Value) -> BoxFuture<'static, anyhow::Result<()>>
where
    J: Job + DeserializeOwned + 'static,
{
    Box::pin(async move {
        let job: J = serde_json::from_value(args)?;
        job.perform(&ctx).await
    })
}

/// Job types known to one tracker, keyed by name.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<&'static str, Registration>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<J>(&self, hooks: Vec<Arc<dyn LifecycleHook>>)
    where
        J: Job + DeserializeOwned + 'static,
    {
        let registration = Registration {
            job_type: JobType::of::<J>(),
            handler: perform_job::<J>,
            hooks,
        };
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(J::name(), registration);
    }

    pub fn get(&self, name: &str) -> Option<Registration> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(name).cloned()
    }

    pub fn job_type(&self, name: &str) -> Option<JobType> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(name).map(|r| r.job_type)
    }

    pub fn job_types(&self) -> Vec<&'static str> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.keys().copied().collect()
    }
}
