// src/tracker.rs
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::config::{QueueConfig, TrackerConfig};
use crate::error::{MetaError, Result};
use crate::hooks::{self, HookContext, LifecycleHook};
use crate::identity::JobId;
use crate::job::{Job, JobType};
use crate::job_metadata::Metadata;
use crate::kv::{KvStore, MemoryKv, RedisKv};
use crate::meta_store::MetaStore;
use crate::queue::{Broker, Envelope, MemoryBroker, RedisBroker};
use crate::registry::JobRegistry;
use crate::runner::{start_worker_pool, Worker};


/// Entry point for producers and workers: owns the metadata store, the
/// job registry and the queue connection. Clones share all of them.
#[derive(Clone)]
pub struct Tracker {
    store: MetaStore,
    registry: Arc<JobRegistry>,
    broker: Arc<dyn Broker>,
    config: Arc<TrackerConfig>,
}

impl Tracker {
    pub fn new(config: TrackerConfig, kv: Arc<dyn KvStore>, broker: Arc<dyn Broker>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let store = MetaStore::new(kv, Arc::clone(&registry), config.expiration);
        Self {
            store,
            registry,
            broker,
            config: Arc::new(config),
        }
    }

    /// Redis-backed tracker using `config.redis_url` for both metadata and queues.
    pub async fn connect(config: TrackerConfig) -> Result<Self> {
        let kv = RedisKv::connect(&config.redis_url).await?;
        let broker = RedisBroker::connect(&config.redis_url).await?;
        info!(redis_url = %config.redis_url, expiration = ?config.expiration, "Tracker connected");
        Ok(Self::new(config, Arc::new(kv), Arc::new(broker)))
    }

    pub fn in_memory(config: TrackerConfig) -> Self {
        Self::new(config, Arc::new(MemoryKv::new()), Arc::new(MemoryBroker::new()))
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &MetaStore {
        &self.store
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Registers `J` with metadata tracking as its only hook.
    pub fn register<J>(&self)
    where
        J: Job + DeserializeOwned + 'static,
    {
        self.register_with_hooks::<J>(hooks::default_hooks());
    }

    /// Registers `J` with exactly the listed hooks, run in order.
    pub fn register_with_hooks<J>(&self, hooks: Vec<Arc<dyn LifecycleHook>>)
    where
        J: Job + DeserializeOwned + 'static,
    {
        info!(job_type = J::name(), queue = J::queue(), hooks = hooks.len(), "Registered job");
        self.registry.register::<J>(hooks);
    }

    /// Enqueues `job` and returns its id once the before-enqueue hooks have
    /// completed, so no worker can see the id before its record exists.
    pub async fn enqueue_id<J>(&self, job: J) -> Result<JobId>
    where
        J: Job + Serialize + 'static,
    {
        let envelope = self.prepare(&job).await?;
        let job_id = envelope.job_id.clone();
        self.push::<J>(envelope).await?;
        Ok(job_id)
    }

    /// Enqueues `job` and returns the metadata record written for it. A job
    /// type without metadata tracking is rejected before anything is queued.
    pub async fn enqueue<J>(&self, job: J) -> Result<Metadata>
    where
        J: Job + Serialize + 'static,
    {
        let envelope = self.prepare(&job).await?;
        let Some(meta) = self.get_meta::<J>(&envelope.job_id).await? else {
            return Err(MetaError::NotTracked(envelope.job_id));
        };
        self.push::<J>(envelope).await?;
        Ok(meta)
    }

    /// Resolves the id and args of `job` and runs its before-enqueue hooks.
    async fn prepare<J>(&self, job: &J) -> Result<Envelope>
    where
        J: Job + Serialize + 'static,
    {
        let registration = self
            .registry
            .get(J::name())
            .ok_or_else(|| MetaError::UnregisteredJob(J::name().to_string()))?;

        let job_id = job.job_identity()?;
        let args = serde_json::to_value(job)?;

        let ctx = HookContext {
            store: &self.store,
            job_type: &registration.job_type,
            job_id: &job_id,
            args: &args,
        };
        hooks::run_before_enqueue(&registration.hooks, &ctx).await?;

        Ok(Envelope {
            job_type: J::name().to_string(),
            job_id,
            args,
        })
    }

    async fn push<J: Job>(&self, envelope: Envelope) -> Result<()> {
        self.broker.push(J::queue(), serde_json::to_string(&envelope)?).await?;
        info!(job_id = %envelope.job_id, job_type = J::name(), queue = J::queue(), "Enqueued job");
        Ok(())
    }

    /// Metadata for `job_id`, only if it was produced by `J`.
    pub async fn get_meta<J: Job>(&self, job_id: &JobId) -> Result<Option<Metadata>> {
        self.store.get(job_id, Some(&JobType::of::<J>())).await
    }

    /// Metadata for `job_id` whatever its job type.
    pub async fn get_any_meta(&self, job_id: &JobId) -> Result<Option<Metadata>> {
        self.store.get(job_id, None).await
    }

    pub async fn save(&self, meta: &Metadata) -> Result<()> {
        self.store.save(meta).await
    }

    pub async fn reload(&self, meta: &mut Metadata) -> Result<()> {
        self.store.reload(meta).await
    }

    pub fn worker(&self, queue: impl Into<String>) -> Worker {
        Worker::new(self.store.clone(), Arc::clone(&self.broker), queue, self.config.poll_interval)
    }

    /// Spawns `concurrency` polling workers for each queue.
    pub fn start_workers(&self, queues: &[QueueConfig]) {
        for queue in queues {
            info!(queue = %queue.name, concurrency = queue.concurrency, "Worker pool started");
            start_worker_pool(self.worker(queue.name.clone()), queue.concurrency);
        }
    }
}
