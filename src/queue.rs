use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::identity::JobId;
use crate::rdconfig::get_redis_conn;
use crate::utils::constants::{DEAD_JOBS_KEY, PREFIX_QUEUE, QUEUES_KEY};


/// What travels through the queue for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub job_type: String,
    pub job_id: JobId,
    pub args: Value,
}


/// The external queue, reduced to what the tracker drives.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn push(&self, queue: &str, payload: String) -> Result<()>;
    async fn pop(&self, queue: &str) -> Result<Option<String>>;
    async fn len(&self, queue: &str) -> Result<usize>;

    /// Parks a payload no worker can run so it is not lost.
    async fn bury(&self, payload: String) -> Result<()>;
    async fn dead_len(&self) -> Result<usize>;
}


pub struct RedisBroker {
    conn: MultiplexedConnection,
}

impl RedisBroker {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        Ok(Self::new(get_redis_conn(redis_url).await?))
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push(&self, queue: &str, payload: String) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(QUEUES_KEY, queue).await?;
        conn.rpush::<_, _, ()>(format!("{PREFIX_QUEUE}:{queue}"), payload).await?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lpop(format!("{PREFIX_QUEUE}:{queue}"), None).await?)
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(format!("{PREFIX_QUEUE}:{queue}")).await?)
    }

    async fn bury(&self, payload: String) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(DEAD_JOBS_KEY, payload).await?;
        Ok(())
    }

    async fn dead_len(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(DEAD_JOBS_KEY).await?)
    }
}


#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    dead: Mutex<Vec<String>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn push(&self, queue: &str, payload: String) -> Result<()> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.entry(queue.to_string()).or_default().push_back(payload);
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        Ok(queues.get_mut(queue).and_then(VecDeque::pop_front))
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        Ok(queues.get(queue).map_or(0, VecDeque::len))
    }

    async fn bury(&self, payload: String) -> Result<()> {
        let mut dead = self.dead.lock().unwrap_or_else(|e| e.into_inner());
        dead.push(payload);
        Ok(())
    }

    async fn dead_len(&self) -> Result<usize> {
        let dead = self.dead.lock().unwrap_or_else(|e| e.into_inner());
        Ok(dead.len())
    }
}
