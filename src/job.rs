// src/job.rs
use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::identity::{self, JobId};
use crate::job_metadata::Metadata;
use crate::meta_store::MetaStore;
use crate::utils::constants::DEFAULT_EXPIRE_META_IN;


/// A trackable unit of work. The implementing struct is the payload: it is
/// serialized onto the queue and deserialized again on the worker.
#[async_trait]
pub trait Job: Send + Sync {
    async fn perform(&self, ctx: &JobContext) -> anyhow::Result<()>;

    fn name() -> &'static str
    where
        Self: Sized;

    fn queue() -> &'static str
    where
        Self: Sized;

    /// Override to control the job id. Must be unique per enqueue for
    /// tracking to be correct; the store never rejects a duplicate.
    fn job_identity(&self) -> Result<JobId>
    where
        Self: Serialize + Sized,
    {
        identity::generate(Self::name(), self)
    }

    /// Seconds the metadata lives after the reference event. 0 = never expire.
    fn expire_meta_in() -> u64
    where
        Self: Sized,
    {
        DEFAULT_EXPIRE_META_IN
    }
}


/// What the tracking layer knows about a job type. `expire_meta_in` is kept
/// as a function so the TTL is re-read every time a record is loaded.
#[derive(Clone, Copy, Debug)]
pub struct JobType {
    pub name: &'static str,
    pub queue: &'static str,
    expire_meta_in: fn() -> u64,
}

impl JobType {
    pub fn of<J: Job>() -> Self {
        Self {
            name: J::name(),
            queue: J::queue(),
            expire_meta_in: J::expire_meta_in,
        }
    }

    pub fn expire_in(&self) -> u64 {
        (self.expire_meta_in)()
    }
}

impl PartialEq for JobType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for JobType {}


/// Handed to `Job::perform`.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    job_type: JobType,
    store: MetaStore,
}

impl JobContext {
    pub(crate) fn new(job_id: JobId, job_type: JobType, store: MetaStore) -> Self {
        Self {
            job_id,
            job_type,
            store,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }

    /// Metadata for the running job, scoped to its own type.
    pub async fn get_meta(&self) -> Result<Option<Metadata>> {
        self.store.get(&self.job_id, Some(&self.job_type)).await
    }

    /// Writes back a record this job modified. The write replaces whatever is
    /// stored, so a concurrent hook save in between is lost.
    pub async fn save(&self, meta: &Metadata) -> Result<()> {
        self.store.save(meta).await
    }
}
