// src/identity.rs
use std::fmt;

use chrono::Utc;
use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Unique identifier for one enqueued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Mints a job id from the current time, a random token, the job type
/// and its payload. The result is a 64 character lowercase hex string.
///
/// Nothing is coordinated with the store: uniqueness is probabilistic, and
/// a colliding id would silently overwrite the earlier record.
pub fn generate<P>(job_type: &str, payload: &P) -> Result<JobId>
where
    P: Serialize + ?Sized,
{
    let now = Utc::now();
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(nanoid!().as_bytes());
    hasher.update(job_type.as_bytes());
    hasher.update(serde_json::to_vec(payload)?);

    Ok(JobId(format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_generate_is_fixed_length_hex() {
        let id = generate("MetaJob", &("foo", "bar")).unwrap();
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_same_payload_gives_different_ids() {
        let a = generate("MetaJob", &("foo", "bar")).unwrap();
        let b = generate("MetaJob", &("foo", "bar")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_no_collisions_across_concurrent_producers() {
        let ids: Vec<JobId> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    s.spawn(move || {
                        (0..1250)
                            .map(|i| generate("MetaJob", &(t, i % 3)).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(ids.len(), 10_000);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 10_000);
    }

    #[test]
    fn test_job_id_serializes_as_plain_string() {
        let id = JobId::from("abc123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
        assert_eq!(id.to_string(), "abc123");
    }
}
