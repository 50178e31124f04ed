// src/meta_store.rs
//
// Records are written with a plain overwrite. A job saving its own fields
// while a hook saves a state transition is a read-modify-write race: the
// later save wins. Keep user writes inside `perform` and let the hooks own
// the lifecycle fields.
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ExpirationPolicy;
use crate::error::{MetaError, Result};
use crate::identity::JobId;
use crate::job::JobType;
use crate::job_metadata::{Metadata, JOB_CLASS};
use crate::kv::KvStore;
use crate::registry::JobRegistry;
use crate::utils::constants::PREFIX_META;


#[derive(Clone)]
pub struct MetaStore {
    kv: Arc<dyn KvStore>,
    registry: Arc<JobRegistry>,
    policy: ExpirationPolicy,
}

impl MetaStore {
    pub fn new(kv: Arc<dyn KvStore>, registry: Arc<JobRegistry>, policy: ExpirationPolicy) -> Self {
        Self { kv, registry, policy }
    }

    pub fn key(job_id: &JobId) -> String {
        format!("{PREFIX_META}:{job_id}")
    }

    pub fn policy(&self) -> ExpirationPolicy {
        self.policy
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Unconditionally overwrites the record. `expire_at <= 0` leaves the
    /// key without a TTL.
    pub async fn store(&self, job_id: &JobId, fields: &Map<String, Value>, expire_at: i64) -> Result<()> {
        let key = Self::key(job_id);
        let payload = serde_json::to_string(fields)?;
        self.kv.set(&key, &payload, expire_at).await?;
        debug!(job_id = %job_id, expire_at, "Stored job metadata");
        Ok(())
    }

    /// Raw fields for `job_id`. Absent when missing, expired, or owned by a
    /// job class other than `job_class`.
    pub async fn load(&self, job_id: &JobId, job_class: Option<&str>) -> Result<Option<Map<String, Value>>> {
        let key = Self::key(job_id);
        let Some(json) = self.kv.get(&key).await? else {
            return Ok(None);
        };

        let fields = match serde_json::from_str::<Value>(&json) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => {
                return Err(MetaError::Corrupt {
                    key,
                    reason: format!("expected an object, found {other}"),
                })
            }
            Err(e) => {
                return Err(MetaError::Corrupt {
                    key,
                    reason: e.to_string(),
                })
            }
        };

        if let Some(expected) = job_class {
            let stored = fields.get(JOB_CLASS).and_then(Value::as_str);
            if stored != Some(expected) {
                debug!(job_id = %job_id, expected, stored = ?stored, "Metadata belongs to another job class");
                return Ok(None);
            }
        }

        Ok(Some(fields))
    }

    /// Loads and decodes a record. With `job_type` the lookup is scoped to
    /// that type; without it the stored class is resolved through the registry.
    pub async fn get(&self, job_id: &JobId, job_type: Option<&JobType>) -> Result<Option<Metadata>> {
        let Some(fields) = self.load(job_id, job_type.map(|t| t.name)).await? else {
            return Ok(None);
        };

        let key = Self::key(job_id);
        let resolved = match job_type {
            Some(t) => *t,
            None => {
                let class = fields
                    .get(JOB_CLASS)
                    .and_then(Value::as_str)
                    .ok_or_else(|| MetaError::Corrupt {
                        key: key.clone(),
                        reason: "missing job_class".to_string(),
                    })?;
                self.registry
                    .job_type(class)
                    .ok_or_else(|| MetaError::UnknownJobClass(class.to_string()))?
            }
        };

        Metadata::from_fields(&key, fields, resolved, self.policy).map(Some)
    }

    pub async fn save(&self, meta: &Metadata) -> Result<()> {
        self.store(meta.job_id(), &meta.to_fields(), meta.expire_at()).await
    }

    /// Refreshes `meta` from the store. Leaves it untouched if the record is gone.
    pub async fn reload(&self, meta: &mut Metadata) -> Result<()> {
        if let Some(fresh) = self.get(meta.job_id(), Some(meta.job_type())).await? {
            meta.replace_state(fresh);
        }
        Ok(())
    }
}
