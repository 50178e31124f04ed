// src/lib.rs
//! Job identity, metadata and lifecycle tracking for queue-backed jobs.
//!
//! Each enqueued job gets a unique id and a metadata record in an expiring
//! key-value store. Lifecycle hooks run by the worker move the record from
//! enqueued to working to finished, and the record expires a configurable
//! number of seconds after it finishes (or after it was enqueued).
pub mod config;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod job;
pub mod job_metadata;
pub mod kv;
pub mod meta_store;
pub mod queue;
pub mod rdconfig;
pub mod registry;
pub mod runner;
pub mod tracker;

pub mod utils {
    pub mod constants;
}

pub use config::{ExpirationPolicy, QueueConfig, TrackerConfig};
pub use error::{MetaError, Result};
pub use hooks::{HookContext, LifecycleHook, MetaHooks};
pub use identity::JobId;
pub use job::{Job, JobContext, JobType};
pub use job_metadata::{JobStatus, Metadata};
pub use kv::{KvStore, MemoryKv, RedisKv};
pub use meta_store::MetaStore;
pub use queue::{Broker, Envelope, MemoryBroker, RedisBroker};
pub use runner::{WorkOutcome, Worker};
pub use tracker::Tracker;
