// src/job_metadata.rs
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::{Map, Value};

use crate::config::ExpirationPolicy;
use crate::error::{MetaError, Result};
use crate::identity::JobId;
use crate::job::JobType;
use crate::utils::constants::MAX_EXPIRE_AT;

pub const JOB_ID: &str = "job_id";
pub const JOB_CLASS: &str = "job_class";
pub const ENQUEUED_AT: &str = "enqueued_at";
pub const STARTED_AT: &str = "started_at";
pub const FINISHED_AT: &str = "finished_at";
pub const SUCCEEDED: &str = "succeeded";

pub const RESERVED_KEYS: [&str; 6] = [JOB_ID, JOB_CLASS, ENQUEUED_AT, STARTED_AT, FINISHED_AT, SUCCEEDED];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Enqueued,
    Working,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Enqueued => "enqueued",
            JobStatus::Working => "working",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}


/// Tracked state of one job: lifecycle timestamps plus free-form user data.
///
/// Changes only reach the store through `MetaStore::save`.
#[derive(Debug, Clone)]
pub struct Metadata {
    job_id: JobId,
    job_type: JobType,
    enqueued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    succeeded: Option<bool>,
    data: Map<String, Value>,
    expire_in: u64,
    policy: ExpirationPolicy,
}

impl Metadata {
    pub fn new(job_id: JobId, job_type: JobType, policy: ExpirationPolicy) -> Self {
        Self {
            job_id,
            job_type,
            enqueued_at: now(),
            started_at: None,
            finished_at: None,
            succeeded: None,
            data: Map::new(),
            expire_in: job_type.expire_in(),
            policy,
        }
    }

    /// Rebuilds a record from stored fields. `job_type` must be the type named
    /// by the `job_class` field; its TTL is read fresh.
    pub fn from_fields(
        key: &str,
        mut fields: Map<String, Value>,
        job_type: JobType,
        policy: ExpirationPolicy,
    ) -> Result<Self> {
        let job_id = match fields.remove(JOB_ID) {
            Some(Value::String(id)) => JobId(id),
            _ => return Err(corrupt(key, "missing job_id")),
        };
        fields.remove(JOB_CLASS);

        let enqueued_at = take_time(key, &mut fields, ENQUEUED_AT)?.unwrap_or_else(now);
        let started_at = take_time(key, &mut fields, STARTED_AT)?;
        let finished_at = take_time(key, &mut fields, FINISHED_AT)?;
        let succeeded = match fields.remove(SUCCEEDED) {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(b),
            Some(other) => return Err(corrupt(key, &format!("succeeded is not a bool: {other}"))),
        };

        Ok(Self {
            job_id,
            job_type,
            enqueued_at,
            started_at,
            finished_at,
            succeeded,
            data: fields,
            expire_in: job_type.expire_in(),
            policy,
        })
    }

    /// Flat map as persisted: user data plus the reserved lifecycle keys.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = self.data.clone();
        fields.insert(JOB_ID.into(), Value::String(self.job_id.0.clone()));
        fields.insert(JOB_CLASS.into(), Value::String(self.job_type.name.to_string()));
        fields.insert(ENQUEUED_AT.into(), Value::String(format_time(&self.enqueued_at)));
        if let Some(t) = &self.started_at {
            fields.insert(STARTED_AT.into(), Value::String(format_time(t)));
        }
        if let Some(t) = &self.finished_at {
            fields.insert(FINISHED_AT.into(), Value::String(format_time(t)));
        }
        if let Some(b) = self.succeeded {
            fields.insert(SUCCEEDED.into(), Value::Bool(b));
        }
        fields
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn job_class(&self) -> &'static str {
        self.job_type.name
    }

    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }

    pub fn expire_in(&self) -> u64 {
        self.expire_in
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if is_reserved(&key) {
            return Err(MetaError::ReservedKey(key));
        }
        self.data.insert(key, value.into());
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Marks the job as started. Returns false if it already was.
    pub fn start(&mut self) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now());
        true
    }

    /// Marks the job finished. Success is assumed unless `fail` decided
    /// otherwise. Returns false if the record was already finished.
    pub fn finish(&mut self) -> bool {
        if self.finished_at.is_some() {
            return false;
        }
        self.succeeded.get_or_insert(true);
        self.finished_at = Some(now());
        true
    }

    pub fn fail(&mut self) -> bool {
        if self.finished_at.is_some() {
            return false;
        }
        self.succeeded = Some(false);
        self.finish()
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn is_enqueued(&self) -> bool {
        !self.is_started()
    }

    pub fn is_working(&self) -> bool {
        self.is_started() && !self.is_finished()
    }

    /// `None` until the job finishes, or when a finished record carries no outcome.
    pub fn succeeded(&self) -> Option<bool> {
        self.succeeded.filter(|_| self.is_finished())
    }

    pub fn failed(&self) -> Option<bool> {
        self.succeeded().map(|s| !s)
    }

    pub fn status(&self) -> JobStatus {
        // A finished record without an outcome was finished, not failed.
        match (self.is_started(), self.is_finished(), self.succeeded()) {
            (_, true, Some(false)) => JobStatus::Failed,
            (_, true, _) => JobStatus::Succeeded,
            (true, false, _) => JobStatus::Working,
            (false, false, _) => JobStatus::Enqueued,
        }
    }

    pub fn seconds_enqueued(&self) -> f64 {
        seconds_between(self.enqueued_at, self.started_at.unwrap_or_else(Utc::now))
    }

    pub fn seconds_processing(&self) -> f64 {
        match self.started_at {
            Some(started) => seconds_between(started, self.finished_at.unwrap_or_else(Utc::now)),
            None => 0.0,
        }
    }

    /// Unix time at which the record should be evicted, or 0 for never.
    pub fn expire_at(&self) -> i64 {
        if self.expire_in == 0 {
            return 0;
        }
        let ttl = i64::try_from(self.expire_in).unwrap_or(i64::MAX);
        let reference = match self.policy {
            ExpirationPolicy::FromFinish => match self.finished_at {
                Some(finished) => finished,
                None => return 0,
            },
            ExpirationPolicy::FromEnqueue => self.enqueued_at,
        };
        reference.timestamp().saturating_add(ttl).min(MAX_EXPIRE_AT)
    }

    /// Takes the stored state of `other` while keeping this record's identity.
    pub(crate) fn replace_state(&mut self, other: Metadata) {
        self.enqueued_at = other.enqueued_at;
        self.started_at = other.started_at;
        self.finished_at = other.finished_at;
        self.succeeded = other.succeeded;
        self.data = other.data;
        self.expire_in = other.expire_in;
    }
}


// Stored timestamps carry microseconds, so keep in-memory ones at the same precision.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn take_time(key: &str, fields: &mut Map<String, Value>, name: &str) -> Result<Option<DateTime<Utc>>> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| corrupt(key, &format!("{name} '{s}': {e}"))),
        Some(other) => Err(corrupt(key, &format!("{name} is not a timestamp: {other}"))),
    }
}

fn corrupt(key: &str, reason: &str) -> MetaError {
    MetaError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from)
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or(0.0)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobContext};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct ShortLived;

    #[async_trait]
    impl Job for ShortLived {
        async fn perform(&self, _ctx: &JobContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn name() -> &'static str {
            "ShortLived"
        }
        fn queue() -> &'static str {
            "test"
        }
        fn expire_meta_in() -> u64 {
            60
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Forever;

    #[async_trait]
    impl Job for Forever {
        async fn perform(&self, _ctx: &JobContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn name() -> &'static str {
            "Forever"
        }
        fn queue() -> &'static str {
            "test"
        }
        fn expire_meta_in() -> u64 {
            0
        }
    }

    fn new_meta(policy: ExpirationPolicy) -> Metadata {
        Metadata::new(JobId::from("abc"), JobType::of::<ShortLived>(), policy)
    }

    #[test]
    fn test_new_record_is_enqueued() {
        let meta = new_meta(ExpirationPolicy::FromFinish);
        assert!(meta.is_enqueued());
        assert!(!meta.is_started());
        assert!(!meta.is_working());
        assert!(!meta.is_finished());
        assert_eq!(meta.succeeded(), None);
        assert_eq!(meta.failed(), None);
        assert_eq!(meta.seconds_processing(), 0.0);
        assert_eq!(meta.status(), JobStatus::Enqueued);
        assert_eq!(meta.job_class(), "ShortLived");
        assert_eq!(meta.expire_in(), 60);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut meta = new_meta(ExpirationPolicy::FromFinish);
        assert!(meta.start());
        assert!(meta.is_working());
        assert_eq!(meta.status(), JobStatus::Working);

        let started = meta.started_at();
        assert!(!meta.start(), "start is at most once");
        assert_eq!(meta.started_at(), started);

        assert!(meta.finish());
        assert!(meta.is_finished());
        assert!(!meta.is_working());
        assert_eq!(meta.succeeded(), Some(true));
        assert_eq!(meta.status(), JobStatus::Succeeded);
    }

    #[test]
    fn test_finished_state_is_terminal() {
        let mut meta = new_meta(ExpirationPolicy::FromFinish);
        meta.start();
        meta.finish();
        let finished = meta.finished_at();

        assert!(!meta.fail());
        assert!(!meta.finish());
        assert_eq!(meta.succeeded(), Some(true));
        assert_eq!(meta.finished_at(), finished);

        let mut failed = new_meta(ExpirationPolicy::FromFinish);
        failed.start();
        assert!(failed.fail());
        assert!(!failed.finish());
        assert_eq!(failed.succeeded(), Some(false));
        assert_eq!(failed.failed(), Some(true));
        assert_eq!(failed.status(), JobStatus::Failed);
    }

    #[test]
    fn test_reserved_keys_are_rejected() {
        let mut meta = new_meta(ExpirationPolicy::FromFinish);
        for key in RESERVED_KEYS {
            assert!(matches!(meta.set(key, "x"), Err(MetaError::ReservedKey(_))));
        }
        meta.set("foo", "bar").unwrap();
        assert_eq!(meta.get("foo"), Some(&Value::from("bar")));
        assert_eq!(meta.remove("foo"), Some(Value::from("bar")));
        assert!(meta.get("foo").is_none());
    }

    #[test]
    fn test_expire_at_from_finish() {
        let mut meta = new_meta(ExpirationPolicy::FromFinish);
        assert_eq!(meta.expire_at(), 0);
        meta.start();
        assert_eq!(meta.expire_at(), 0);
        meta.finish();
        let finished = meta.finished_at().unwrap();
        assert_eq!(meta.expire_at(), finished.timestamp() + 60);
    }

    #[test]
    fn test_expire_at_from_enqueue() {
        let meta = new_meta(ExpirationPolicy::FromEnqueue);
        assert_eq!(meta.expire_at(), meta.enqueued_at().timestamp() + 60);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let mut meta = Metadata::new(JobId::from("x"), JobType::of::<Forever>(), ExpirationPolicy::FromFinish);
        meta.start();
        meta.finish();
        assert_eq!(meta.expire_at(), 0);

        let meta = Metadata::new(JobId::from("y"), JobType::of::<Forever>(), ExpirationPolicy::FromEnqueue);
        assert_eq!(meta.expire_at(), 0);
    }

    #[test]
    fn test_fields_roundtrip_keeps_state_and_data() {
        let mut meta = new_meta(ExpirationPolicy::FromFinish);
        meta.set("foo", "bar").unwrap();
        meta.start();
        meta.fail();

        let fields = meta.to_fields();
        assert_eq!(fields.get(JOB_CLASS), Some(&Value::from("ShortLived")));
        assert_eq!(fields.get(SUCCEEDED), Some(&Value::Bool(false)));

        let restored = Metadata::from_fields(
            "snm:meta:abc",
            fields,
            JobType::of::<ShortLived>(),
            ExpirationPolicy::FromFinish,
        )
        .unwrap();
        assert_eq!(restored.job_id(), meta.job_id());
        assert_eq!(restored.started_at(), meta.started_at());
        assert_eq!(restored.finished_at(), meta.finished_at());
        assert_eq!(restored.failed(), Some(true));
        assert_eq!(restored.get("foo"), Some(&Value::from("bar")));
        assert_eq!(restored.data().len(), 1);
    }

    #[derive(Serialize, Deserialize)]
    struct Huge;

    #[async_trait]
    impl Job for Huge {
        async fn perform(&self, _ctx: &JobContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn name() -> &'static str {
            "Huge"
        }
        fn queue() -> &'static str {
            "test"
        }
        fn expire_meta_in() -> u64 {
            u64::MAX
        }
    }

    #[derive(Serialize, Deserialize)]
    struct AlmostHuge;

    #[async_trait]
    impl Job for AlmostHuge {
        async fn perform(&self, _ctx: &JobContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn name() -> &'static str {
            "AlmostHuge"
        }
        fn queue() -> &'static str {
            "test"
        }
        fn expire_meta_in() -> u64 {
            i64::MAX as u64
        }
    }

    #[test]
    fn test_oversized_ttl_clamps_to_far_future() {
        for policy in [ExpirationPolicy::FromFinish, ExpirationPolicy::FromEnqueue] {
            let mut huge = Metadata::new(JobId::from("h"), JobType::of::<Huge>(), policy);
            huge.start();
            huge.finish();
            assert_eq!(huge.expire_at(), MAX_EXPIRE_AT);

            let mut almost = Metadata::new(JobId::from("a"), JobType::of::<AlmostHuge>(), policy);
            almost.start();
            almost.finish();
            assert_eq!(almost.expire_at(), MAX_EXPIRE_AT);
        }
    }

    #[test]
    fn test_finished_record_without_outcome_reports_none() {
        let mut fields = new_meta(ExpirationPolicy::FromFinish).to_fields();
        fields.insert(STARTED_AT.into(), Value::from("2024-05-19T13:42:41.000000Z"));
        fields.insert(FINISHED_AT.into(), Value::from("2024-05-19T13:42:42.000000Z"));

        let meta = Metadata::from_fields("k", fields, JobType::of::<ShortLived>(), ExpirationPolicy::FromFinish)
            .unwrap();
        assert!(meta.is_finished());
        assert_eq!(meta.succeeded(), None);
        assert_eq!(meta.failed(), None);
        assert_eq!(meta.status(), JobStatus::Succeeded);
    }

    #[test]
    fn test_bad_timestamp_is_corrupt() {
        let mut fields = new_meta(ExpirationPolicy::FromFinish).to_fields();
        fields.insert(STARTED_AT.into(), Value::from("yesterday"));
        let err = Metadata::from_fields("k", fields, JobType::of::<ShortLived>(), ExpirationPolicy::FromFinish)
            .unwrap_err();
        assert!(matches!(err, MetaError::Corrupt { .. }));
    }
}
